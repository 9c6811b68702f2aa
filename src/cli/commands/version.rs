//! Version command implementation.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::commands::{home_dir, load_config};
use crate::error::Result;
use crate::model::RemoteKind;

const BACKENDS: [RemoteKind; 2] = [RemoteKind::Github, RemoteKind::AzureDevops];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionOutput {
    version: &'static str,
    backends: Vec<&'static str>,
    /// Provider the current configuration selects, if it names a valid one.
    active_provider: Option<&'static str>,
}

/// Print the version, the backends this build speaks and the active one.
///
/// A missing or broken configuration is not an error here.
pub fn execute(home: Option<&PathBuf>, provider: Option<&str>, json: bool) -> Result<()> {
    let active = home_dir(home)
        .and_then(|home| load_config(&home, provider))
        .and_then(|config| config.provider_kind())
        .ok();

    let output = VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        backends: BACKENDS.iter().map(RemoteKind::as_str).collect(),
        active_provider: active.as_ref().map(RemoteKind::as_str),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("tsync {}", output.version);
    println!("  backends: {}", output.backends.join(", "));
    println!("  provider: {}", output.active_provider.unwrap_or("(none)"));
    Ok(())
}
