//! Auth command implementation.

use std::path::PathBuf;

use colored::Colorize;

use crate::cli::commands::{block_on, home_dir, load_config, orchestrator};
use crate::error::Result;
use crate::remote::RemoteAdapter;

/// Validate the configured credentials against the remote.
pub fn execute(home: Option<&PathBuf>, provider: Option<&str>, json: bool) -> Result<()> {
    let home = home_dir(home)?;
    let config = load_config(&home, provider)?;
    let orch = orchestrator(&home, &config, None)?;
    let kind = orch.adapter().kind();

    block_on(orch.authenticate())?;
    let rate = orch.adapter().check_rate_limit();

    if json {
        let output = serde_json::json!({
            "provider": kind,
            "authenticated": true,
            "rateLimit": rate,
        });
        println!("{output}");
        return Ok(());
    }

    println!("{} Authenticated with {kind}", "✓".green());
    if let Some(rate) = rate {
        let limit = rate.limit.map_or_else(|| "?".to_string(), |l| l.to_string());
        println!(
            "  Rate limit: {}/{limit} remaining, resets {}",
            rate.remaining,
            rate.reset_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
