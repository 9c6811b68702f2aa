//! Adapter construction from configuration.

use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::model::RemoteKind;
use crate::remote::adapter::BoxedAdapter;
use crate::remote::azure::AzureDevopsAdapter;
use crate::remote::github::GithubAdapter;

/// Build the adapter for `kind` with credentials from `config`.
///
/// The provider is always passed in explicitly; nothing here reads
/// process-wide state.
///
/// # Errors
///
/// Returns `Config` if the settings for `kind` are incomplete.
pub fn create_adapter(kind: RemoteKind, config: &Config) -> Result<BoxedAdapter> {
    let timeout = config.sync.request_timeout();
    debug!(provider = %kind, timeout_ms = config.sync.request_timeout_ms, "Creating adapter");
    match kind {
        RemoteKind::Github => Ok(BoxedAdapter::new(GithubAdapter::new(&config.github, timeout)?)),
        RemoteKind::AzureDevops => Ok(BoxedAdapter::new(AzureDevopsAdapter::new(
            &config.azure,
            timeout,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::remote::adapter::RemoteAdapter;

    #[test]
    fn test_missing_credentials_is_config_error() {
        let err = create_adapter(RemoteKind::Github, &Config::default()).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("GITHUB_TOKEN")));
    }

    #[test]
    fn test_builds_requested_kind() {
        let mut config = Config::default();
        config.azure.organization = Some("org".into());
        config.azure.project = Some("Project".into());
        config.azure.token = Some("pat".into());
        let adapter = create_adapter(RemoteKind::AzureDevops, &config).unwrap();
        assert_eq!(adapter.kind(), RemoteKind::AzureDevops);
    }
}
