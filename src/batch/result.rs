//! Batch summary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Error;
use crate::remote::RateLimitInfo;
use crate::sync::SyncOperation;

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub item: String,
    /// Machine-readable error code (`AUTH_FAILED`, `TRANSIENT_FAILURE`, ...).
    pub code: String,
    pub error: String,
}

/// Summary of one batch run. Read-only once built.
///
/// `succeeded + failed + aborted == total` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    operation: SyncOperation,
    total: usize,
    succeeded: usize,
    failed: usize,
    aborted: usize,
    duration_ms: u64,
    errors: Vec<ItemError>,
    rate_limit_state: Option<RateLimitInfo>,
    /// Count of successful items per outcome label.
    outcomes: BTreeMap<String, usize>,
    dry_run: bool,
    cancelled: bool,
    estimated_duration_ms: Option<u64>,
}

impl BatchResult {
    #[must_use]
    pub fn operation(&self) -> SyncOperation {
        self.operation
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Items never started or cut off by cancellation or a fatal error.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.aborted
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    #[must_use]
    pub fn errors(&self) -> &[ItemError] {
        &self.errors
    }

    #[must_use]
    pub fn rate_limit_state(&self) -> Option<RateLimitInfo> {
        self.rate_limit_state
    }

    #[must_use]
    pub fn outcomes(&self) -> &BTreeMap<String, usize> {
        &self.outcomes
    }

    #[must_use]
    pub fn outcome_count(&self, label: &str) -> usize {
        self.outcomes.get(label).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn estimated_duration_ms(&self) -> Option<u64> {
        self.estimated_duration_ms
    }

    /// Every item succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Counters owned by the batch coordinator.
#[derive(Debug)]
pub(crate) struct Tally {
    operation: SyncOperation,
    total: usize,
    succeeded: usize,
    failed: usize,
    errors: Vec<ItemError>,
    outcomes: BTreeMap<String, usize>,
}

impl Tally {
    pub(crate) fn new(operation: SyncOperation, total: usize) -> Self {
        Self {
            operation,
            total,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
            outcomes: BTreeMap::new(),
        }
    }

    pub(crate) fn succeed(&mut self, label: &str) {
        self.succeeded += 1;
        *self.outcomes.entry(label.to_string()).or_default() += 1;
    }

    pub(crate) fn fail(&mut self, item: &str, error: &Error) {
        self.failed += 1;
        self.errors.push(ItemError {
            item: item.to_string(),
            code: error.error_code().as_str().to_string(),
            error: error.to_string(),
        });
    }

    pub(crate) fn done(&self) -> usize {
        self.succeeded + self.failed
    }

    pub(crate) fn finish(self, run: RunInfo) -> BatchResult {
        BatchResult {
            operation: self.operation,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            aborted: self.total - self.succeeded - self.failed,
            duration_ms: run.duration_ms,
            errors: self.errors,
            rate_limit_state: run.rate_limit_state,
            outcomes: self.outcomes,
            dry_run: run.dry_run,
            cancelled: run.cancelled,
            estimated_duration_ms: run.estimated_duration_ms,
        }
    }
}

/// Run-level facts added when the tally is closed.
#[derive(Debug, Default)]
pub(crate) struct RunInfo {
    pub duration_ms: u64,
    pub rate_limit_state: Option<RateLimitInfo>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub estimated_duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_add_up() {
        let mut tally = Tally::new(SyncOperation::Push, 5);
        tally.succeed("pushed");
        tally.succeed("pushed");
        tally.succeed("unchanged");
        tally.fail("wi_x", &Error::Transient("503".into()));
        let result = tally.finish(RunInfo::default());

        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.aborted(), 1);
        assert_eq!(result.outcome_count("pushed"), 2);
        assert_eq!(result.errors()[0].code, "TRANSIENT_FAILURE");
        assert!(!result.is_complete());
    }

    #[test]
    fn test_serializes_camel_case() {
        let result = Tally::new(SyncOperation::Pull, 0).finish(RunInfo {
            dry_run: true,
            estimated_duration_ms: Some(0),
            ..RunInfo::default()
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["operation"], "pull");
        assert_eq!(json["dryRun"], true);
        assert_eq!(json["estimatedDurationMs"], 0);
        assert!(json.get("rateLimitState").is_some());
    }

    #[test]
    fn test_aborted_error_carries_partial() {
        let mut tally = Tally::new(SyncOperation::Push, 3);
        tally.succeed("pushed");
        let err = Error::BatchAborted {
            cause: Box::new(Error::Auth("bad token".into())),
            partial: Box::new(tally.finish(RunInfo::default())),
        };
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("1 of 3"));
        let json = err.to_structured_json();
        assert_eq!(json["error"]["partial"]["aborted"], 2);
    }
}
