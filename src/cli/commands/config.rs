//! Config command implementations.

use std::path::PathBuf;

use crate::cli::commands::{home_dir, load_config};
use crate::cli::ConfigCommands;
use crate::config::{config_path, Config};
use crate::error::Result;

/// Execute config commands.
pub fn execute(
    command: &ConfigCommands,
    home: Option<&PathBuf>,
    provider: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let home = home_dir(home)?;
    let path = config_path(&home);

    match command {
        ConfigCommands::Show => {
            let config = load_config(&home, provider)?.redacted();
            if json {
                println!("{}", serde_json::to_string(&config)?);
            } else {
                println!("# {}", path.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        ConfigCommands::Set { key, value } => {
            // File only: environment overrides must not leak into the file.
            let mut config = Config::load(&path)?;
            config.set_key(key, value)?;
            if dry_run {
                println!("Would set {key} in {}", path.display());
                return Ok(());
            }
            config.save(&path)?;
            if json {
                println!("{}", serde_json::json!({ "key": key, "path": path }));
            } else {
                println!("Set {key}");
            }
        }
        ConfigCommands::Path => {
            if json {
                println!("{}", serde_json::json!({ "path": path }));
            } else {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
