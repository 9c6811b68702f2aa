//! Typed configuration document.
//!
//! Loaded from `<home>/config.json`, then overlaid with environment
//! variables. CLI flags are applied last by the command layer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::RemoteKind;
use crate::sync::file::atomic_write_json;
use crate::sync::ConflictStrategy;
use crate::validate::normalize_strategy;

/// GitHub Issues connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubSettings {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    /// API root, for GitHub Enterprise.
    pub endpoint: Option<String>,
}

/// Azure DevOps Boards connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureSettings {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub token: Option<String>,
    pub endpoint: Option<String>,
    /// Work item type created for tasks (`Task` unless the process says otherwise).
    pub default_work_item_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub strategy: ConflictStrategy,
    pub request_timeout_ms: u64,
    /// A synced record older than this is reported as stale.
    pub stale_after_secs: u64,
    /// Comment on the remote item when a conflict is resolved automatically.
    pub annotate_conflicts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::Newest,
            request_timeout_ms: 30_000,
            stale_after_secs: 86_400,
            annotate_conflicts: false,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub threshold: u32,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub assumed_item_latency_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            threshold: 10,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            assumed_item_latency_ms: 500,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Active backend name (`github` or `azure_devops`).
    pub provider: Option<String>,
    pub github: GithubSettings,
    pub azure: AzureSettings,
    pub sync: SyncConfig,
    pub batch: BatchConfig,
}

/// Keys accepted by [`Config::set_key`].
pub const SETTABLE_KEYS: &[&str] = &[
    "provider",
    "github.token",
    "github.owner",
    "github.repo",
    "github.endpoint",
    "azure.organization",
    "azure.project",
    "azure.token",
    "azure.endpoint",
    "azure.defaultWorkItemType",
    "sync.strategy",
    "sync.requestTimeoutMs",
    "sync.staleAfterSecs",
    "sync.annotateConflicts",
    "batch.maxConcurrent",
    "batch.threshold",
    "batch.maxRetries",
    "batch.baseDelayMs",
    "batch.maxDelayMs",
    "batch.assumedItemLatencyMs",
];

impl Config {
    /// Read the file at `path`. A missing file is the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {e}", path.display())))
    }

    /// Load the file, then overlay the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Write atomically, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Persistence {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write_json(path, self).map_err(|source| Error::Persistence {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from environment variables. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TRACKSYNC_PROVIDER") {
            self.provider = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = get("GITHUB_OWNER") {
            self.github.owner = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.github.repo = Some(v);
        }
        if let Some(v) = get("AZURE_DEVOPS_PAT") {
            self.azure.token = Some(v);
        }
        if let Some(v) = get("AZURE_DEVOPS_ORG") {
            self.azure.organization = Some(v);
        }
        if let Some(v) = get("AZURE_DEVOPS_PROJECT") {
            self.azure.project = Some(v);
        }
    }

    /// The configured provider.
    ///
    /// # Errors
    ///
    /// Returns `Config` when no provider is set or the name is not recognized.
    pub fn provider_kind(&self) -> Result<RemoteKind> {
        let name = self.provider.as_deref().ok_or_else(|| {
            Error::Config(
                "No provider configured (set TRACKSYNC_PROVIDER or `tsync config set provider github`)"
                    .to_string(),
            )
        })?;
        RemoteKind::parse(name).ok_or_else(|| {
            Error::Config(format!(
                "Unknown provider '{name}' (expected github or azure_devops)"
            ))
        })
    }

    /// Set one dotted key from its string form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown keys or unparsable values.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        let text = || Some(value.to_string()).filter(|v| !v.is_empty());
        match key {
            "provider" => {
                if RemoteKind::parse(value).is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "Unknown provider '{value}' (expected github or azure_devops)"
                    )));
                }
                self.provider = text();
            }
            "github.token" => self.github.token = text(),
            "github.owner" => self.github.owner = text(),
            "github.repo" => self.github.repo = text(),
            "github.endpoint" => self.github.endpoint = text(),
            "azure.organization" => self.azure.organization = text(),
            "azure.project" => self.azure.project = text(),
            "azure.token" => self.azure.token = text(),
            "azure.endpoint" => self.azure.endpoint = text(),
            "azure.defaultWorkItemType" => self.azure.default_work_item_type = text(),
            "sync.strategy" => self.sync.strategy = normalize_strategy(value)?,
            "sync.requestTimeoutMs" => self.sync.request_timeout_ms = parse_num(key, value)?,
            "sync.staleAfterSecs" => self.sync.stale_after_secs = parse_num(key, value)?,
            "sync.annotateConflicts" => self.sync.annotate_conflicts = parse_bool(key, value)?,
            "batch.maxConcurrent" => {
                let n: usize = parse_num(key, value)?;
                if n == 0 {
                    return Err(Error::InvalidArgument(
                        "batch.maxConcurrent must be at least 1".to_string(),
                    ));
                }
                self.batch.max_concurrent = n;
            }
            "batch.threshold" => self.batch.threshold = parse_num(key, value)?,
            "batch.maxRetries" => self.batch.max_retries = parse_num(key, value)?,
            "batch.baseDelayMs" => self.batch.base_delay_ms = parse_num(key, value)?,
            "batch.maxDelayMs" => self.batch.max_delay_ms = parse_num(key, value)?,
            "batch.assumedItemLatencyMs" => {
                self.batch.assumed_item_latency_ms = parse_num(key, value)?;
            }
            _ => {
                let suggestion = SETTABLE_KEYS
                    .iter()
                    .min_by_key(|k| crate::validate::levenshtein_distance(k, key))
                    .map(|k| format!(" (did you mean '{k}'?)"))
                    .unwrap_or_default();
                return Err(Error::InvalidArgument(format!(
                    "Unknown config key '{key}'{suggestion}"
                )));
            }
        }
        Ok(())
    }

    /// Copy with every token replaced by a mask, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        out.github.token = out.github.token.as_deref().map(mask);
        out.azure.token = out.azure.token.as_deref().map(mask);
        out
    }
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{key} expects a non-negative number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(Error::InvalidArgument(format!(
            "{key} expects true or false, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.batch.max_concurrent, 10);
        assert_eq!(config.sync.strategy, ConflictStrategy::Newest);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let mut config = Config::default();
        config.provider = Some("azure_devops".into());
        config.github.owner = Some("from-file".into());
        config.github.repo = Some("repo".into());
        config.save(&path).unwrap();

        let mut loaded = Config::load(&path).unwrap();
        loaded.apply_env(env(&[
            ("TRACKSYNC_PROVIDER", "github"),
            ("GITHUB_OWNER", "from-env"),
            ("GITHUB_TOKEN", ""),
        ]));
        assert_eq!(loaded.provider_kind().unwrap(), RemoteKind::Github);
        assert_eq!(loaded.github.owner.as_deref(), Some("from-env"));
        assert_eq!(loaded.github.repo.as_deref(), Some("repo"));
        assert!(loaded.github.token.is_none());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"batch":{"maxConcurrent":4}}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.batch.max_concurrent, 4);
        assert_eq!(config.batch.max_retries, 3);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_key() {
        let mut config = Config::default();
        config.set_key("sync.strategy", "theirs").unwrap();
        assert_eq!(config.sync.strategy, ConflictStrategy::Remote);
        config.set_key("batch.maxConcurrent", "25").unwrap();
        assert_eq!(config.batch.max_concurrent, 25);
        config.set_key("sync.annotateConflicts", "yes").unwrap();
        assert!(config.sync.annotate_conflicts);

        assert!(config.set_key("batch.maxConcurrent", "0").is_err());
        assert!(config.set_key("provider", "jira").is_err());
        let err = config.set_key("github.tokn", "x").unwrap_err();
        assert!(err.to_string().contains("github.token"));
    }

    #[test]
    fn test_redacted_hides_tokens() {
        let mut config = Config::default();
        config.github.token = Some("ghp_abcdefghijkl1234".into());
        config.azure.token = Some("short".into());
        let shown = config.redacted();
        assert_eq!(shown.github.token.as_deref(), Some("****1234"));
        assert_eq!(shown.azure.token.as_deref(), Some("****"));
    }

    #[test]
    fn test_provider_required() {
        assert!(matches!(
            Config::default().provider_kind(),
            Err(Error::Config(_))
        ));
    }
}
