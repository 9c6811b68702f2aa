//! Command implementations.

pub mod auth;
pub mod comment;
pub mod completions;
pub mod config;
pub mod item;
pub mod status;
pub mod sync;
pub mod version;

use std::path::{Path, PathBuf};

use crate::config::{config_path, db_path, resolve_home, Config};
use crate::error::{Error, Result};
use crate::remote::{create_adapter, BoxedAdapter};
use crate::storage::SqliteLocalStore;
use crate::sync::{ConflictStrategy, MappingStore, SyncOrchestrator, SyncSettings};

/// Orchestrator as wired by the CLI.
pub type CliOrchestrator = SyncOrchestrator<BoxedAdapter, SqliteLocalStore>;

/// Resolve the home directory from `--home`, `TRACKSYNC_HOME` or the default.
pub(crate) fn home_dir(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    resolve_home(explicit.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine home directory; pass --home".to_string()))
}

/// Config file plus environment, with `--provider` on top.
pub(crate) fn load_config(home: &Path, provider: Option<&str>) -> Result<Config> {
    let mut config = Config::resolve(&config_path(home))?;
    if let Some(provider) = provider {
        config.provider = Some(provider.to_string());
    }
    Ok(config)
}

pub(crate) fn open_local(home: &Path) -> Result<SqliteLocalStore> {
    SqliteLocalStore::open(&db_path(home))
}

/// Build the orchestrator for the configured provider.
pub(crate) fn orchestrator(
    home: &Path,
    config: &Config,
    strategy: Option<ConflictStrategy>,
) -> Result<CliOrchestrator> {
    let kind = config.provider_kind()?;
    let adapter = create_adapter(kind, config)?;
    let store = MappingStore::open_in_home(home, kind)?;
    let mut settings = SyncSettings::from(&config.sync);
    if let Some(strategy) = strategy {
        settings.strategy = strategy;
    }
    Ok(SyncOrchestrator::new(adapter, open_local(home)?, store)?.with_settings(settings))
}

/// Run an async command body on a fresh runtime.
pub(crate) fn block_on<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    rt.block_on(fut)
}
