//! Sync mapping store.
//!
//! Persists the local ↔ remote id bijection for one remote kind, plus the
//! per-record metadata the conflict resolver needs. Every mutation runs in
//! one locked section: clone the map, mutate the clone, write it to disk,
//! then swap it in. A failed write leaves both disk and memory untouched.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::RemoteKind;
use crate::sync::file::atomic_write_json;
use crate::sync::types::{RecordMeta, SyncMap, SyncRecord, SyncState};

/// Mapping store for one remote kind.
#[derive(Debug)]
pub struct MappingStore {
    kind: RemoteKind,
    /// `None` keeps the map in memory only.
    path: Option<PathBuf>,
    map: Mutex<SyncMap>,
}

impl MappingStore {
    /// Open (or start) the store document at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or belongs to a different remote kind.
    pub fn open(path: impl Into<PathBuf>, kind: RemoteKind) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let map: SyncMap = serde_json::from_str(&content)?;
            if map.remote_kind != kind {
                return Err(Error::Config(format!(
                    "{} holds {} mappings, expected {kind}",
                    path.display(),
                    map.remote_kind
                )));
            }
            map
        } else {
            SyncMap::empty(kind)
        };

        debug!(path = %path.display(), records = map.metadata.len(), "Opened mapping store");

        Ok(Self {
            kind,
            path: Some(path),
            map: Mutex::new(map),
        })
    }

    /// Open the store for `kind` under a tracksync home directory.
    ///
    /// # Errors
    ///
    /// See [`MappingStore::open`].
    pub fn open_in_home(home: &Path, kind: RemoteKind) -> Result<Self> {
        Self::open(store_path(home, kind), kind)
    }

    /// A store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(kind: RemoteKind) -> Self {
        Self {
            kind,
            path: None,
            map: Mutex::new(SyncMap::empty(kind)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RemoteKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current document.
    #[must_use]
    pub fn load(&self) -> SyncMap {
        self.lock().clone()
    }

    /// Replace the whole document.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the write fails, and `Validation` if the
    /// document is for another remote kind.
    pub fn save(&self, map: SyncMap) -> Result<()> {
        if map.remote_kind != self.kind {
            return Err(Error::Validation(format!(
                "cannot save {} mappings into the {} store",
                map.remote_kind, self.kind
            )));
        }
        let mut guard = self.lock();
        self.persist(&map)?;
        *guard = map;
        Ok(())
    }

    /// Insert or update the record for `local_id`.
    ///
    /// `last_sync` never moves backwards. Re-pointing a local id at a new
    /// remote id releases the old remote id.
    ///
    /// # Errors
    ///
    /// Returns `MappingConflict` if `remote_id` already belongs to another
    /// local id, and `Persistence` if the write fails.
    pub fn upsert(
        &self,
        local_id: &str,
        remote_id: &str,
        remote_kind: RemoteKind,
        meta: RecordMeta,
    ) -> Result<SyncRecord> {
        if remote_kind != self.kind {
            return Err(Error::Validation(format!(
                "cannot record a {remote_kind} mapping in the {} store",
                self.kind
            )));
        }

        self.mutate(|map| {
            if let Some(owner) = map.remote_to_local.get(remote_id) {
                if owner != local_id {
                    return Err(Error::MappingConflict {
                        remote_id: remote_id.to_string(),
                        existing_local: owner.clone(),
                        local_id: local_id.to_string(),
                    });
                }
            }

            let previous = map.metadata.get(local_id);
            let last_sync = previous.map_or(meta.synced_at, |p| p.last_sync.max(meta.synced_at));

            if let Some(old_remote) = map.local_to_remote.get(local_id) {
                if old_remote != remote_id {
                    let old_remote = old_remote.clone();
                    map.remote_to_local.remove(&old_remote);
                }
            }

            let record = SyncRecord {
                local_id: local_id.to_string(),
                remote_id: remote_id.to_string(),
                remote_kind,
                last_sync,
                last_action: meta.action,
                last_known_remote_updated_at: meta.remote_updated_at,
                state: meta.state,
                local_hash: meta.local_hash,
            };

            map.local_to_remote.insert(local_id.to_string(), remote_id.to_string());
            map.remote_to_local.insert(remote_id.to_string(), local_id.to_string());
            map.metadata.insert(local_id.to_string(), record.clone());
            Ok(record)
        })
    }

    /// Change the lifecycle state of an existing record.
    ///
    /// Returns `None` if `local_id` has no record.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the write fails.
    pub fn set_state(&self, local_id: &str, state: SyncState) -> Result<Option<SyncRecord>> {
        if self.lookup_by_local(local_id).is_none() {
            return Ok(None);
        }
        self.mutate(|map| {
            Ok(map.metadata.get_mut(local_id).map(|record| {
                record.state = state;
                record.clone()
            }))
        })
    }

    #[must_use]
    pub fn lookup_by_local(&self, local_id: &str) -> Option<SyncRecord> {
        self.lock().metadata.get(local_id).cloned()
    }

    #[must_use]
    pub fn lookup_by_remote(&self, remote_id: &str) -> Option<SyncRecord> {
        let map = self.lock();
        map.remote_to_local
            .get(remote_id)
            .and_then(|local| map.metadata.get(local))
            .cloned()
    }

    /// All records, ordered by local id.
    #[must_use]
    pub fn records(&self) -> Vec<SyncRecord> {
        self.lock().metadata.values().cloned().collect()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut SyncMap) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, map: &SyncMap) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        atomic_write_json(path, map).map_err(|source| Error::Persistence {
            path: path.clone(),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SyncMap> {
        // A panic mid-mutation never reaches the swap, so the map is intact.
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Location of the mapping document for `kind` under `home`.
#[must_use]
pub fn store_path(home: &Path, kind: RemoteKind) -> PathBuf {
    home.join("sync").join(format!("{}.json", kind.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::SyncAction;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn meta(action: SyncAction) -> RecordMeta {
        RecordMeta {
            synced_at: Utc::now(),
            action,
            remote_updated_at: None,
            state: SyncState::Synced,
            local_hash: None,
        }
    }

    #[test]
    fn test_upsert_and_lookup_both_ways() {
        let store = MappingStore::in_memory(RemoteKind::Github);
        store
            .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap();

        assert_eq!(store.lookup_by_local("wi_1").unwrap().remote_id, "101");
        assert_eq!(store.lookup_by_remote("101").unwrap().local_id, "wi_1");
        assert!(store.lookup_by_remote("102").is_none());
    }

    #[test]
    fn test_bijection_guard() {
        let store = MappingStore::in_memory(RemoteKind::Github);
        store
            .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap();

        let err = store
            .upsert("wi_2", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap_err();
        assert!(matches!(err, Error::MappingConflict { ref existing_local, .. } if existing_local == "wi_1"));
        assert!(store.lookup_by_local("wi_2").is_none());
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_repointing_releases_old_remote() {
        let store = MappingStore::in_memory(RemoteKind::Github);
        store
            .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap();
        store
            .upsert("wi_1", "202", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap();

        assert!(store.lookup_by_remote("101").is_none());
        store
            .upsert("wi_2", "101", RemoteKind::Github, meta(SyncAction::Pull))
            .unwrap();
    }

    #[test]
    fn test_last_sync_is_monotonic() {
        let store = MappingStore::in_memory(RemoteKind::Github);
        let first = store
            .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap();

        let mut older = meta(SyncAction::Pull);
        older.synced_at = first.last_sync - Duration::minutes(5);
        let second = store.upsert("wi_1", "101", RemoteKind::Github, older).unwrap();

        assert_eq!(second.last_sync, first.last_sync);
        assert_eq!(second.last_action, SyncAction::Pull);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let store = MappingStore::in_memory(RemoteKind::Github);
        let err = store
            .upsert("wi_1", "5", RemoteKind::AzureDevops, meta(SyncAction::Push))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_set_state() {
        let store = MappingStore::in_memory(RemoteKind::AzureDevops);
        assert!(store.set_state("wi_1", SyncState::Archived).unwrap().is_none());

        store
            .upsert("wi_1", "5", RemoteKind::AzureDevops, meta(SyncAction::Pull))
            .unwrap();
        let archived = store.set_state("wi_1", SyncState::Archived).unwrap().unwrap();
        assert_eq!(archived.state, SyncState::Archived);
        assert_eq!(store.lookup_by_remote("5").unwrap().state, SyncState::Archived);
    }

    #[test]
    fn test_persists_and_reloads() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = MappingStore::open_in_home(temp_dir.path(), RemoteKind::Github).unwrap();
            store
                .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
                .unwrap();
        }

        let path = store_path(temp_dir.path(), RemoteKind::Github);
        assert!(path.ends_with("sync/github.json"));

        let reopened = MappingStore::open(&path, RemoteKind::Github).unwrap();
        assert_eq!(reopened.lookup_by_remote("101").unwrap().local_id, "wi_1");
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        // Parent of the store path is a regular file, so every write fails.
        let blocker = temp_dir.path().join("sync");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = MappingStore::open(blocker.join("github.json"), RemoteKind::Github).unwrap();
        let err = store
            .upsert("wi_1", "101", RemoteKind::Github, meta(SyncAction::Push))
            .unwrap_err();

        assert!(matches!(err, Error::Persistence { .. }));
        assert!(err.is_batch_fatal());
        assert!(store.lookup_by_local("wi_1").is_none());
    }

    #[test]
    fn test_open_rejects_foreign_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("github.json");
        let other = MappingStore::open(&path, RemoteKind::AzureDevops).unwrap();
        other
            .upsert("wi_1", "9", RemoteKind::AzureDevops, meta(SyncAction::Push))
            .unwrap();

        assert!(matches!(
            MappingStore::open(&path, RemoteKind::Github),
            Err(Error::Config(_))
        ));
    }
}
