//! Single-item sync workflows.
//!
//! The orchestrator drives push, pull and bidirectional sync for one item
//! at a time. It owns the mapping store and the rate gate; the batch
//! processor fans its operations out over many items.

use std::future::Future;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::batch::throttle::RateGate;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{new_local_id, ItemFields, ItemFilter, RemoteItem, WorkItem};
use crate::remote::RemoteAdapter;
use crate::storage::LocalStore;
use crate::sync::conflict::{detect_conflict, ConflictResolver};
use crate::sync::hash::fields_hash;
use crate::sync::store::MappingStore;
use crate::sync::types::{
    ConflictReport, ConflictStrategy, Decision, PullResult, RecordMeta, SyncAction, SyncOperation,
    SyncOutcome, SyncRecord, SyncState, SyncStatusView,
};

/// About a century; keeps `TimeDelta` in range.
const MAX_STALE_SECS: u64 = 3_153_600_000;

/// Knobs for single-item operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub strategy: ConflictStrategy,
    /// Upper bound for each adapter call.
    pub request_timeout: Duration,
    /// A synced record older than this is stale.
    pub stale_after: TimeDelta,
    /// Comment on the remote item after resolving a conflict automatically.
    pub annotate_conflicts: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            strategy: config.strategy,
            request_timeout: config.request_timeout(),
            stale_after: TimeDelta::seconds(
                i64::try_from(config.stale_after_secs.min(MAX_STALE_SECS)).unwrap_or_default(),
            ),
            annotate_conflicts: config.annotate_conflicts,
        }
    }
}

/// Drives sync for one remote kind.
pub struct SyncOrchestrator<A, L> {
    adapter: A,
    local: L,
    store: MappingStore,
    gate: RateGate,
    settings: SyncSettings,
    resolver: ConflictResolver,
    clock: Clock,
    authenticated: OnceCell<()>,
}

impl<A: std::fmt::Debug, L> std::fmt::Debug for SyncOrchestrator<A, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("adapter", &self.adapter)
            .field("store", &self.store)
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<A: RemoteAdapter, L: LocalStore> SyncOrchestrator<A, L> {
    /// # Errors
    ///
    /// Returns `Config` if the mapping store belongs to another remote kind.
    pub fn new(adapter: A, local: L, store: MappingStore) -> Result<Self> {
        if store.kind() != adapter.kind() {
            return Err(Error::Config(format!(
                "mapping store is for {} but the adapter talks to {}",
                store.kind(),
                adapter.kind()
            )));
        }
        let clock = Clock::new();
        Ok(Self {
            adapter,
            local,
            store,
            gate: RateGate::new(10, clock),
            settings: SyncSettings::default(),
            resolver: ConflictResolver::new(),
            clock,
            authenticated: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use `clock` for sync stamps and rate-limit waits.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.gate = RateGate::new(self.gate.threshold(), clock);
        self.clock = clock;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    // ── Adapter access ───────────────────────────────────────

    /// Run one adapter call behind the rate gate and the request timeout.
    ///
    /// Refused with `Cancelled` once the gate's interrupt token has fired.
    async fn call<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if !self.gate.wait_ready().await {
            return Err(Error::Cancelled {
                operation: op.to_string(),
            });
        }
        debug!(op, provider = %self.adapter.kind(), "Adapter call");

        let result = match tokio::time::timeout(self.settings.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: op.to_string(),
                after_ms: u64::try_from(self.settings.request_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
        };

        if let Err(Error::RateLimited { reset_at, .. }) = &result {
            self.gate.observe_exhausted(*reset_at);
        }
        self.gate.observe(self.adapter.check_rate_limit());
        result
    }

    /// Validate credentials.
    ///
    /// # Errors
    ///
    /// Returns `Auth` when the remote rejects the credentials.
    pub async fn authenticate(&self) -> Result<()> {
        self.call("authenticate", self.adapter.authenticate()).await
    }

    /// Validate credentials once per orchestrator. Failures are not cached.
    ///
    /// # Errors
    ///
    /// See [`authenticate`](Self::authenticate).
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.authenticated
            .get_or_try_init(|| self.authenticate())
            .await
            .map(|_| ())
    }

    /// List remote items.
    ///
    /// # Errors
    ///
    /// Returns the adapter error.
    pub async fn list_remote(&self, filter: &ItemFilter) -> Result<Vec<RemoteItem>> {
        self.call("list_items", self.adapter.list_items(filter)).await
    }

    // ── Push ─────────────────────────────────────────────────

    /// Create or update the remote copy of `item`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for archived items. When the remote item has
    /// vanished the record is archived and `RemoteNotFound` is returned.
    pub async fn push_to_remote(&self, item: &WorkItem) -> Result<SyncRecord> {
        let existing = self.store.lookup_by_local(&item.local_id);
        self.push_with(item, existing.as_ref(), SyncAction::Push).await
    }

    async fn push_with(
        &self,
        item: &WorkItem,
        existing: Option<&SyncRecord>,
        action: SyncAction,
    ) -> Result<SyncRecord> {
        let remote = match existing {
            Some(record) if record.state == SyncState::Archived => {
                return Err(Error::Validation(format!(
                    "{} is archived: remote item {} no longer exists",
                    item.local_id, record.remote_id
                )));
            }
            Some(record) => {
                debug!(item = %item.local_id, remote_id = %record.remote_id, "Updating remote item");
                match self
                    .call("update_item", self.adapter.update_item(&record.remote_id, &item.fields))
                    .await
                {
                    Err(e @ Error::RemoteNotFound { .. }) => {
                        self.archive(record)?;
                        return Err(e);
                    }
                    other => other?,
                }
            }
            None => {
                debug!(item = %item.local_id, "Creating remote item");
                self.call("create_item", self.adapter.create_item(&item.fields))
                    .await?
            }
        };
        self.record(&item.local_id, &item.fields, &remote, action)
    }

    // ── Pull ─────────────────────────────────────────────────

    /// Fetch a remote item and map it to a local item.
    ///
    /// The returned item is not written; the caller persists it.
    ///
    /// # Errors
    ///
    /// Returns adapter errors other than not-found, and mapping errors.
    pub async fn pull_from_remote(&self, remote_id: &str) -> Result<PullResult> {
        self.pull_with(remote_id, false).await
    }

    async fn pull_with(&self, remote_id: &str, persist: bool) -> Result<PullResult> {
        let existing = self.store.lookup_by_remote(remote_id);
        let remote = match self.call("get_item", self.adapter.get_item(remote_id)).await {
            Ok(remote) => remote,
            Err(Error::RemoteNotFound { .. }) => {
                let record = match &existing {
                    Some(record) => self.archive(record)?,
                    None => None,
                };
                return Ok(PullResult::Archived {
                    remote_id: remote_id.to_string(),
                    record,
                });
            }
            Err(e) => return Err(e),
        };
        let (item, record) = self.adopt(remote, existing.as_ref(), SyncAction::Pull, persist)?;
        Ok(PullResult::Pulled { item, record })
    }

    /// Turn a remote copy into the local item and record the mapping.
    ///
    /// With `persist`, the local write happens before the mapping update so
    /// a failed write never leaves a record claiming the item is in sync.
    fn adopt(
        &self,
        remote: RemoteItem,
        existing: Option<&SyncRecord>,
        action: SyncAction,
        persist: bool,
    ) -> Result<(WorkItem, SyncRecord)> {
        let local_id = existing.map_or_else(new_local_id, |r| r.local_id.clone());
        let item = WorkItem {
            local_id,
            fields: remote.fields.normalized(),
            created_at: remote.created_at,
            updated_at: remote.effective_timestamp(),
        };
        if persist {
            self.local.write_entity(&item)?;
        }
        let record = self.record(&item.local_id, &item.fields, &remote, action)?;
        debug!(item = %item.local_id, remote_id = %remote.remote_id, "Pulled remote item");
        Ok((item, record))
    }

    // ── Bidirectional ────────────────────────────────────────

    /// Reconcile `item` with its remote copy.
    ///
    /// Items the caller must write back are returned in the outcome.
    ///
    /// # Errors
    ///
    /// Returns adapter errors other than not-found, mapping errors, and
    /// `Validation` when a merge hook fails.
    pub async fn sync_bidirectional(&self, item: &WorkItem) -> Result<SyncOutcome> {
        self.sync_with(item, false).await
    }

    async fn sync_with(&self, item: &WorkItem, persist: bool) -> Result<SyncOutcome> {
        let Some(record) = self.store.lookup_by_local(&item.local_id) else {
            let record = self.push_with(item, None, SyncAction::Bidirectional).await?;
            return Ok(SyncOutcome::Pushed(record));
        };

        if record.state == SyncState::Archived {
            return Ok(SyncOutcome::Skipped {
                local_id: item.local_id.clone(),
                reason: format!("remote item {} was deleted", record.remote_id),
            });
        }

        let remote = match self
            .call("get_item", self.adapter.get_item(&record.remote_id))
            .await
        {
            Ok(remote) => remote,
            Err(Error::RemoteNotFound { .. }) => {
                self.archive(&record)?;
                return Ok(SyncOutcome::Archived {
                    local_id: Some(item.local_id.clone()),
                    remote_id: record.remote_id,
                });
            }
            Err(e) => return Err(e),
        };

        let report = detect_conflict(item, &remote, Some(&record));
        let nothing_to_move = report.conflicting_fields.is_empty()
            || (!report.local_changed && !report.remote_changed);
        if nothing_to_move {
            let record = self.record(&item.local_id, &item.fields, &remote, SyncAction::Bidirectional)?;
            return Ok(SyncOutcome::Unchanged(record));
        }

        match (report.local_changed, report.remote_changed, report.has_conflict) {
            (false, true, _) => {
                let (item, record) =
                    self.adopt(remote, Some(&record), SyncAction::Bidirectional, persist)?;
                Ok(SyncOutcome::Pulled { item, record })
            }
            (true, true, true) => self.resolve_conflict(item, remote, &record, report, persist).await,
            // Local changes only, or both changed with equal timestamps.
            _ => {
                let record = self
                    .push_with(item, Some(&record), SyncAction::Bidirectional)
                    .await?;
                Ok(SyncOutcome::Pushed(record))
            }
        }
    }

    async fn resolve_conflict(
        &self,
        item: &WorkItem,
        remote: RemoteItem,
        record: &SyncRecord,
        report: ConflictReport,
        persist: bool,
    ) -> Result<SyncOutcome> {
        let decision = self.resolver.resolve(&report, self.settings.strategy);
        let hook = self.resolver.merge_hook();
        info!(
            item = %item.local_id,
            remote_id = %record.remote_id,
            decision = decision.as_str(),
            fields = %report.conflicting_fields.join(","),
            "Conflict detected"
        );

        match (decision, hook) {
            (Decision::UseLocal, _) => {
                let record = self
                    .push_with(item, Some(record), SyncAction::Bidirectional)
                    .await?;
                self.annotate(&record.remote_id, decision, &report).await;
                Ok(SyncOutcome::Resolved {
                    decision,
                    record,
                    item: None,
                    report,
                })
            }
            (Decision::UseRemote, _) => {
                let (item, record) =
                    self.adopt(remote, Some(record), SyncAction::Bidirectional, persist)?;
                self.annotate(&record.remote_id, decision, &report).await;
                Ok(SyncOutcome::Resolved {
                    decision,
                    record,
                    item: Some(item),
                    report,
                })
            }
            (Decision::Merge, Some(hook)) => {
                let mut merged = hook(item, &remote).map_err(|e| {
                    Error::Validation(format!("merge hook failed for {}: {e:#}", item.local_id))
                })?;
                merged.local_id.clone_from(&item.local_id);
                merged.created_at = item.created_at.or(merged.created_at);
                merged.updated_at = Some(self.clock.now());
                if persist {
                    self.local.write_entity(&merged)?;
                }
                let record = self
                    .push_with(&merged, Some(record), SyncAction::Bidirectional)
                    .await?;
                self.annotate(&record.remote_id, decision, &report).await;
                Ok(SyncOutcome::Resolved {
                    decision,
                    record,
                    item: Some(merged),
                    report,
                })
            }
            _ => {
                self.store.set_state(&item.local_id, SyncState::Conflicted)?;
                warn!(item = %item.local_id, "Conflict needs manual resolution");
                Ok(SyncOutcome::NeedsManualInput(report))
            }
        }
    }

    /// Leave a note on the remote item. Failures only log.
    async fn annotate(&self, remote_id: &str, decision: Decision, report: &ConflictReport) {
        if !self.settings.annotate_conflicts {
            return;
        }
        let text = format!(
            "tracksync resolved a sync conflict ({}); conflicting fields: {}",
            decision.as_str(),
            report.conflicting_fields.join(", ")
        );
        if let Err(e) = self
            .call("add_comment", self.adapter.add_comment(remote_id, &text))
            .await
        {
            warn!(remote_id, error = %e, "Failed to annotate resolved conflict");
        }
    }

    // ── Status and comments ──────────────────────────────────

    #[must_use]
    pub fn get_sync_status(&self, local_id: &str) -> SyncStatusView {
        let record = self.store.lookup_by_local(local_id);
        let (state, fresh) = match &record {
            None => ("unsynced".to_string(), false),
            Some(r) => (
                r.state.as_str().to_string(),
                r.state == SyncState::Synced && self.clock.now() - r.last_sync < self.settings.stale_after,
            ),
        };
        SyncStatusView {
            local_id: local_id.to_string(),
            remote_kind: self.adapter.kind(),
            record,
            state,
            fresh,
        }
    }

    /// Comment on the remote copy of a local item.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the item was never synced or is archived.
    pub async fn add_comment(&self, local_id: &str, text: &str) -> Result<()> {
        let record = self.store.lookup_by_local(local_id).ok_or_else(|| {
            Error::Validation(format!("{local_id} is not synced to {}", self.adapter.kind()))
        })?;
        if record.state == SyncState::Archived {
            return Err(Error::Validation(format!(
                "{local_id} is archived: remote item {} no longer exists",
                record.remote_id
            )));
        }
        self.call("add_comment", self.adapter.add_comment(&record.remote_id, text))
            .await
    }

    // ── Batch entry ──────────────────────────────────────────

    /// Run `op` for one item, reading and writing the local store.
    ///
    /// `item_id` is a remote id for pulls and a local id otherwise.
    ///
    /// # Errors
    ///
    /// Returns the operation's error.
    pub async fn run_operation(&self, op: SyncOperation, item_id: &str) -> Result<SyncOutcome> {
        debug!(item = item_id, op = op.as_str(), "Running operation");
        match op {
            SyncOperation::Push => {
                let item = self.local.read_entity(item_id)?;
                Ok(SyncOutcome::Pushed(self.push_to_remote(&item).await?))
            }
            SyncOperation::Pull => Ok(self.pull_with(item_id, true).await?.into()),
            SyncOperation::Bidirectional => {
                let item = self.local.read_entity(item_id)?;
                self.sync_with(&item, true).await
            }
        }
    }

    // ── Mapping helpers ──────────────────────────────────────

    fn record(
        &self,
        local_id: &str,
        fields: &ItemFields,
        remote: &RemoteItem,
        action: SyncAction,
    ) -> Result<SyncRecord> {
        self.store.upsert(
            local_id,
            &remote.remote_id,
            self.adapter.kind(),
            RecordMeta {
                synced_at: self.clock.now(),
                action,
                remote_updated_at: remote.effective_timestamp(),
                state: SyncState::Synced,
                local_hash: Some(fields_hash(fields)),
            },
        )
    }

    fn archive(&self, record: &SyncRecord) -> Result<Option<SyncRecord>> {
        warn!(
            item = %record.local_id,
            remote_id = %record.remote_id,
            "Remote item is gone, archiving mapping"
        );
        self.store.set_state(&record.local_id, SyncState::Archived)
    }
}
