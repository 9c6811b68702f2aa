//! Sync types: mapping records, conflict verdicts and per-item outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{RemoteKind, WorkItem};

/// Direction of the last successful sync of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Push,
    Pull,
    Bidirectional,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Bidirectional => "bidirectional",
        }
    }
}

/// Lifecycle state of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Synced,
    /// Both sides diverged and nobody picked a winner yet.
    Conflicted,
    /// The remote item is gone. The record is kept.
    Archived,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Conflicted => "conflicted",
            Self::Archived => "archived",
        }
    }
}

/// Persistent link between one local item and one remote item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub local_id: String,
    pub remote_id: String,
    pub remote_kind: RemoteKind,
    pub last_sync: DateTime<Utc>,
    pub last_action: SyncAction,
    #[serde(default)]
    pub last_known_remote_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: SyncState,
    /// Content hash of the local fields as of `last_sync`.
    #[serde(default)]
    pub local_hash: Option<String>,
}

/// What an upsert records alongside the id pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub synced_at: DateTime<Utc>,
    pub action: SyncAction,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub state: SyncState,
    pub local_hash: Option<String>,
}

/// The on-disk mapping document for one remote kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMap {
    pub remote_kind: RemoteKind,
    #[serde(default)]
    pub local_to_remote: BTreeMap<String, String>,
    #[serde(default)]
    pub remote_to_local: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, SyncRecord>,
}

impl SyncMap {
    #[must_use]
    pub fn empty(remote_kind: RemoteKind) -> Self {
        Self {
            remote_kind,
            local_to_remote: BTreeMap::new(),
            remote_to_local: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// How to settle a genuine conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Local copy wins.
    Local,
    /// Remote copy wins.
    Remote,
    /// Whichever side was modified last wins.
    #[default]
    Newest,
    /// Surface the conflict and do nothing.
    Manual,
    /// Hand both copies to a caller-supplied merge hook.
    Merge,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Newest => "newest",
            Self::Manual => "manual",
            Self::Merge => "merge",
        }
    }
}

/// Comparison of a local and remote snapshot of the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub local_id: String,
    pub has_conflict: bool,
    pub local_newer: bool,
    pub remote_newer: bool,
    pub conflicting_fields: Vec<String>,
    pub local_changed: bool,
    pub remote_changed: bool,
}

/// Verdict of applying a strategy to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    UseLocal,
    UseRemote,
    Merge,
    NeedsManualInput,
}

impl Decision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UseLocal => "use_local",
            Self::UseRemote => "use_remote",
            Self::Merge => "merge",
            Self::NeedsManualInput => "needs_manual_input",
        }
    }
}

/// Per-item operation the batch processor can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// Item ids are local ids.
    Push,
    /// Item ids are remote ids.
    Pull,
    /// Item ids are local ids.
    Bidirectional,
}

impl SyncOperation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Bidirectional => "bidirectional",
        }
    }
}

/// Result of pulling one remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullResult {
    /// The remote copy, mapped to a local item for the local store to persist.
    Pulled { item: WorkItem, record: SyncRecord },
    /// The remote item no longer exists; its record (if any) is now archived.
    Archived { remote_id: String, record: Option<SyncRecord> },
}

/// Result of one orchestrator operation on one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Pushed(SyncRecord),
    Pulled { item: WorkItem, record: SyncRecord },
    /// Neither side changed since the last sync.
    Unchanged(SyncRecord),
    /// A conflict settled by the configured strategy.
    Resolved {
        decision: Decision,
        record: SyncRecord,
        /// Set when the local store must persist a new copy.
        item: Option<WorkItem>,
        report: ConflictReport,
    },
    NeedsManualInput(ConflictReport),
    Archived { local_id: Option<String>, remote_id: String },
    Skipped { local_id: String, reason: String },
}

impl SyncOutcome {
    /// Short label used in batch tallies and human output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pushed(_) => "pushed",
            Self::Pulled { .. } => "pulled",
            Self::Unchanged(_) => "unchanged",
            Self::Resolved { .. } => "resolved",
            Self::NeedsManualInput(_) => "conflicted",
            Self::Archived { .. } => "archived",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// The local item the caller must write back, if any.
    #[must_use]
    pub fn item_to_write(&self) -> Option<&WorkItem> {
        match self {
            Self::Pulled { item, .. } => Some(item),
            Self::Resolved { item, .. } => item.as_ref(),
            _ => None,
        }
    }
}

impl From<PullResult> for SyncOutcome {
    fn from(result: PullResult) -> Self {
        match result {
            PullResult::Pulled { item, record } => Self::Pulled { item, record },
            PullResult::Archived { remote_id, record } => Self::Archived {
                local_id: record.map(|r| r.local_id),
                remote_id,
            },
        }
    }
}

/// Sync status of one local item, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusView {
    pub local_id: String,
    pub remote_kind: RemoteKind,
    pub record: Option<SyncRecord>,
    /// `unsynced` when no record exists.
    pub state: String,
    /// Synced, and synced within the freshness window.
    pub fresh: bool,
}
