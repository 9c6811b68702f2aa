//! Comment command implementation.

use std::path::PathBuf;

use crate::cli::commands::{block_on, home_dir, load_config, orchestrator};
use crate::error::{Error, Result};

/// Post `text` on the remote copy of local item `id`.
pub fn execute(
    id: &str,
    text: &str,
    home: Option<&PathBuf>,
    provider: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation("comment text must not be empty".to_string()));
    }
    let home = home_dir(home)?;
    let config = load_config(&home, provider)?;
    let orch = orchestrator(&home, &config, None)?;

    if dry_run {
        let record = orch.store().lookup_by_local(id);
        if json {
            let output = serde_json::json!({
                "dry_run": true,
                "action": "add_comment",
                "id": id,
                "remote_id": record.as_ref().map(|r| r.remote_id.clone()),
            });
            println!("{output}");
        } else {
            match record {
                Some(r) => println!("Would comment on {} #{}", r.remote_kind, r.remote_id),
                None => println!("{id} is not synced; nothing to comment on"),
            }
        }
        return Ok(());
    }

    block_on(async {
        orch.ensure_authenticated().await?;
        orch.add_comment(id, text).await
    })?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "commented": true }));
    } else {
        println!("Commented on {id}");
    }
    Ok(())
}
