//! Conflict detection and resolution.
//!
//! Pure logic: compares a local and remote snapshot of the same entity
//! against the last sync record, and turns a strategy into a decision.

use std::fmt;
use std::sync::Arc;

use crate::model::{RemoteItem, WorkItem};
use crate::sync::hash::fields_hash;
use crate::sync::types::{ConflictReport, ConflictStrategy, Decision, SyncRecord};

/// Caller-supplied merge of two diverged copies.
///
/// The returned item keeps the local id; its timestamps are restamped by
/// the orchestrator.
pub type MergeFn = Arc<dyn Fn(&WorkItem, &RemoteItem) -> anyhow::Result<WorkItem> + Send + Sync>;

/// Compare both snapshots against the last sync.
///
/// A side counts as changed when there is no record to compare against.
/// Equal timestamps never produce a conflict.
#[must_use]
pub fn detect_conflict(
    local: &WorkItem,
    remote: &RemoteItem,
    last: Option<&SyncRecord>,
) -> ConflictReport {
    let local_ts = local.effective_timestamp();
    let remote_ts = remote.effective_timestamp();

    let local_changed = match last {
        None => true,
        Some(record) => match &record.local_hash {
            Some(hash) => *hash != fields_hash(&local.fields),
            None => local_ts.is_some_and(|ts| ts > record.last_sync),
        },
    };

    let remote_changed = match last.and_then(|r| r.last_known_remote_updated_at) {
        None => true,
        Some(known) => remote_ts.is_some_and(|ts| ts > known),
    };

    let (local_newer, remote_newer) = match (local_ts, remote_ts) {
        (Some(l), Some(r)) => (l > r, r > l),
        _ => (false, false),
    };
    let timestamps_differ = local_newer || remote_newer;

    ConflictReport {
        local_id: local.local_id.clone(),
        has_conflict: timestamps_differ && local_changed && remote_changed,
        local_newer,
        remote_newer,
        conflicting_fields: local
            .fields
            .diff(&remote.fields)
            .into_iter()
            .map(str::to_string)
            .collect(),
        local_changed,
        remote_changed,
    }
}

/// Applies a conflict strategy, with an optional merge hook.
#[derive(Clone, Default)]
pub struct ConflictResolver {
    merge: Option<MergeFn>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("merge_hook", &self.merge.is_some())
            .finish()
    }
}

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a merge hook. Without one, `merge` behaves as `manual`.
    #[must_use]
    pub fn with_merge_hook(mut self, hook: MergeFn) -> Self {
        self.merge = Some(hook);
        self
    }

    #[must_use]
    pub fn merge_hook(&self) -> Option<&MergeFn> {
        self.merge.as_ref()
    }

    /// Deterministic: same report and strategy always give the same decision.
    #[must_use]
    pub fn resolve(&self, report: &ConflictReport, strategy: ConflictStrategy) -> Decision {
        match strategy {
            ConflictStrategy::Local => Decision::UseLocal,
            ConflictStrategy::Remote => Decision::UseRemote,
            ConflictStrategy::Newest => {
                if report.local_newer {
                    Decision::UseLocal
                } else {
                    Decision::UseRemote
                }
            }
            ConflictStrategy::Manual => Decision::NeedsManualInput,
            ConflictStrategy::Merge if self.merge.is_some() => Decision::Merge,
            ConflictStrategy::Merge => Decision::NeedsManualInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemFields, ItemStatus, RemoteKind};
    use crate::sync::types::{SyncAction, SyncState};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn local(title: &str, updated: DateTime<Utc>) -> WorkItem {
        WorkItem {
            local_id: "wi_1".into(),
            fields: ItemFields { title: title.into(), ..ItemFields::default() },
            created_at: Some(t0() - Duration::days(1)),
            updated_at: Some(updated),
        }
    }

    fn remote(title: &str, updated: DateTime<Utc>) -> RemoteItem {
        RemoteItem {
            remote_id: "101".into(),
            fields: ItemFields { title: title.into(), ..ItemFields::default() },
            native_status: "open".into(),
            url: None,
            created_at: Some(t0() - Duration::days(1)),
            updated_at: Some(updated),
        }
    }

    fn record(last_sync: DateTime<Utc>, local_hash: Option<String>) -> SyncRecord {
        SyncRecord {
            local_id: "wi_1".into(),
            remote_id: "101".into(),
            remote_kind: RemoteKind::Github,
            last_sync,
            last_action: SyncAction::Push,
            last_known_remote_updated_at: Some(last_sync),
            state: SyncState::Synced,
            local_hash,
        }
    }

    #[test]
    fn test_local_ten_seconds_newer() {
        let base = record(t0() - Duration::minutes(1), None);
        let report = detect_conflict(
            &local("L", t0() + Duration::seconds(10)),
            &remote("R", t0()),
            Some(&base),
        );
        assert!(report.has_conflict);
        assert!(report.local_newer);
        assert!(!report.remote_newer);
        assert_eq!(report.conflicting_fields, vec!["title"]);
    }

    #[test]
    fn test_equal_timestamps_never_conflict() {
        let base = record(t0() - Duration::minutes(1), None);
        let report = detect_conflict(&local("L", t0()), &remote("R", t0()), Some(&base));
        assert!(!report.has_conflict);
        assert!(!report.local_newer);
        assert!(!report.remote_newer);
        assert!(report.local_changed && report.remote_changed);
    }

    #[test]
    fn test_only_remote_changed_is_not_a_conflict() {
        let item = local("same", t0() - Duration::hours(1));
        let base = record(t0() - Duration::minutes(30), Some(fields_hash(&item.fields)));
        let report = detect_conflict(&item, &remote("new", t0()), Some(&base));
        assert!(!report.has_conflict);
        assert!(!report.local_changed);
        assert!(report.remote_changed);
    }

    #[test]
    fn test_hash_beats_clock_skew() {
        // Local clock far ahead, but content unchanged since the last sync.
        let item = local("same", t0() + Duration::days(3));
        let base = record(t0() - Duration::minutes(30), Some(fields_hash(&item.fields)));
        let report = detect_conflict(&item, &remote("same", t0()), Some(&base));
        assert!(!report.local_changed);
        assert!(!report.has_conflict);
    }

    #[test]
    fn test_no_record_means_both_changed() {
        let report = detect_conflict(
            &local("L", t0() + Duration::seconds(1)),
            &remote("R", t0()),
            None,
        );
        assert!(report.local_changed && report.remote_changed);
        assert!(report.has_conflict);
    }

    #[test]
    fn test_missing_timestamps_are_not_newer() {
        let mut item = local("L", t0());
        item.updated_at = None;
        item.created_at = None;
        let report = detect_conflict(&item, &remote("R", t0()), None);
        assert!(!report.local_newer && !report.remote_newer);
        assert!(!report.has_conflict);
    }

    #[test]
    fn test_conflicting_fields_lists_each_difference() {
        let mut item = local("L", t0());
        item.fields.status = ItemStatus::Blocked;
        item.fields.assignee = Some("ana".into());
        let report = detect_conflict(&item, &remote("R", t0()), None);
        assert_eq!(report.conflicting_fields, vec!["title", "status", "assignee"]);
    }

    #[test]
    fn test_strategies_are_deterministic() {
        let resolver = ConflictResolver::new();
        let base = record(t0() - Duration::minutes(1), None);
        let report = detect_conflict(
            &local("L", t0() + Duration::seconds(10)),
            &remote("R", t0()),
            Some(&base),
        );

        for _ in 0..3 {
            assert_eq!(resolver.resolve(&report, ConflictStrategy::Local), Decision::UseLocal);
            assert_eq!(resolver.resolve(&report, ConflictStrategy::Remote), Decision::UseRemote);
            assert_eq!(resolver.resolve(&report, ConflictStrategy::Newest), Decision::UseLocal);
            assert_eq!(
                resolver.resolve(&report, ConflictStrategy::Manual),
                Decision::NeedsManualInput
            );
        }
    }

    #[test]
    fn test_newest_prefers_remote_when_remote_newer() {
        let resolver = ConflictResolver::new();
        let report = detect_conflict(
            &local("L", t0()),
            &remote("R", t0() + Duration::seconds(10)),
            None,
        );
        assert_eq!(resolver.resolve(&report, ConflictStrategy::Newest), Decision::UseRemote);
    }

    #[test]
    fn test_merge_requires_hook() {
        let report = detect_conflict(
            &local("L", t0() + Duration::seconds(1)),
            &remote("R", t0()),
            None,
        );
        let plain = ConflictResolver::new();
        assert_eq!(plain.resolve(&report, ConflictStrategy::Merge), Decision::NeedsManualInput);

        let hooked = ConflictResolver::new().with_merge_hook(Arc::new(|l: &WorkItem, _r: &RemoteItem| Ok(l.clone())));
        assert_eq!(hooked.resolve(&report, ConflictStrategy::Merge), Decision::Merge);
    }
}
