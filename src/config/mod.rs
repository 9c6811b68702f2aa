//! Configuration management.
//!
//! Everything tracksync keeps on disk lives under one home directory:
//!
//! - `<home>/config.json`: provider, credentials and tuning knobs
//! - `<home>/data/tracksync.db`: the local work item store
//! - `<home>/sync/<kind>.json`: one mapping document per remote kind
//!
//! The home is `TRACKSYNC_HOME` when set, otherwise `~/.tracksync`.

mod settings;

pub use settings::{
    AzureSettings, BatchConfig, Config, GithubSettings, SyncConfig, SETTABLE_KEYS,
};

use std::path::{Path, PathBuf};

/// Default home directory (`~/.tracksync`).
#[must_use]
pub fn default_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tracksync"))
}

/// Resolve the home directory.
///
/// Priority:
/// 1. `explicit` (the `--home` flag)
/// 2. `TRACKSYNC_HOME` environment variable
/// 3. `~/.tracksync`
#[must_use]
pub fn resolve_home(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(home) = std::env::var("TRACKSYNC_HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    default_home()
}

#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.json")
}

#[must_use]
pub fn db_path(home: &Path) -> PathBuf {
    home.join("data").join("tracksync.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_home_prefers_explicit() {
        let explicit = PathBuf::from("/custom/home");
        assert_eq!(resolve_home(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_layout_under_home() {
        let home = Path::new("/h");
        assert_eq!(config_path(home), PathBuf::from("/h/config.json"));
        assert!(db_path(home).ends_with("data/tracksync.db"));
    }

    #[test]
    fn test_default_home_is_dot_tracksync() {
        let home = default_home().unwrap();
        assert!(home.ends_with(".tracksync"));
    }
}
