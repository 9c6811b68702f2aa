//! Batch run options.

use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;

/// Rate-limit and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOptions {
    /// Workers suspend when fewer requests than this remain in the window.
    pub threshold: u32,
    /// Retries after the first attempt, for retryable errors only.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            threshold: 10,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Reported once per item that reached a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Items finished so far, this one included.
    pub current: usize,
    pub total: usize,
    pub item: String,
    pub ok: bool,
}

pub type ProgressFn = Box<dyn FnMut(&ProgressEvent) + Send>;

pub struct BatchOptions {
    pub max_concurrent: usize,
    pub rate_limit: RateLimitOptions,
    /// Plan only: no adapter calls, no mapping changes.
    pub dry_run: bool,
    /// Per-item latency used for the dry-run estimate.
    pub assumed_item_latency_ms: u64,
    pub on_progress: Option<ProgressFn>,
    pub cancel: Option<CancellationToken>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            rate_limit: RateLimitOptions::default(),
            dry_run: false,
            assumed_item_latency_ms: 500,
            on_progress: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("max_concurrent", &self.max_concurrent)
            .field("rate_limit", &self.rate_limit)
            .field("dry_run", &self.dry_run)
            .field("assumed_item_latency_ms", &self.assumed_item_latency_ms)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            rate_limit: RateLimitOptions {
                threshold: config.threshold,
                max_retries: config.max_retries,
                base_delay_ms: config.base_delay_ms,
                max_delay_ms: config.max_delay_ms,
            },
            assumed_item_latency_ms: config.assumed_item_latency_ms,
            ..Self::default()
        }
    }
}

impl BatchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitOptions) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, f: impl FnMut(&ProgressEvent) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BatchOptions::default();
        assert_eq!(options.max_concurrent, 10);
        assert_eq!(options.rate_limit.threshold, 10);
        assert_eq!(options.rate_limit.max_retries, 3);
        assert_eq!(options.rate_limit.base_delay_ms, 1_000);
        assert_eq!(options.rate_limit.max_delay_ms, 30_000);
        assert_eq!(options.assumed_item_latency_ms, 500);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_from_config() {
        let config = BatchConfig {
            max_concurrent: 4,
            max_retries: 0,
            ..BatchConfig::default()
        };
        let options = BatchOptions::from(&config).dry_run(true);
        assert_eq!(options.max_concurrent, 4);
        assert_eq!(options.rate_limit.max_retries, 0);
        assert!(options.dry_run);
    }
}
