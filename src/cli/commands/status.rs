//! Status command implementation.

use std::path::PathBuf;

use crate::cli::commands::{home_dir, load_config, orchestrator};
use crate::error::Result;
use crate::storage::LocalStore;
use crate::sync::{print_status, SyncStatusView};

/// Execute the status command.
///
/// With no ids, reports every item in the local store.
pub fn execute(
    ids: &[String],
    home: Option<&PathBuf>,
    provider: Option<&str>,
    json: bool,
) -> Result<()> {
    let home = home_dir(home)?;
    let config = load_config(&home, provider)?;
    let orch = orchestrator(&home, &config, None)?;

    let ids = if ids.is_empty() {
        orch.local().list_ids()?
    } else {
        ids.to_vec()
    };
    let views: Vec<SyncStatusView> = ids.iter().map(|id| orch.get_sync_status(id)).collect();

    if json {
        let output = serde_json::json!({
            "items": views,
            "count": views.len(),
        });
        println!("{output}");
    } else {
        print_status(&views);
    }
    Ok(())
}
