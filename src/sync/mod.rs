//! Bidirectional sync between the local store and a remote tracker.
//!
//! - **Mapping store**: local ↔ remote id pairs plus per-record metadata,
//!   one JSON document per remote kind, written atomically
//! - **Conflict resolver**: pure comparison of two snapshots against the
//!   last sync, and strategy → decision
//! - **Orchestrator**: push, pull and bidirectional sync of one item
//! - **Hashing**: SHA256 of the syncable fields, so local change detection
//!   does not depend on clocks
//!
//! # Example
//!
//! ```ignore
//! use tsync::sync::{MappingStore, SyncOrchestrator};
//!
//! let store = MappingStore::open_in_home(&home, RemoteKind::Github)?;
//! let orch = SyncOrchestrator::new(adapter, local, store)?;
//! let outcome = orch.sync_bidirectional(&item).await?;
//! ```

pub mod conflict;
pub mod file;
pub mod hash;
pub mod orchestrator;
mod status;
pub mod store;
mod types;

pub use conflict::{detect_conflict, ConflictResolver, MergeFn};
pub use file::{atomic_write, atomic_write_json};
pub use hash::{content_hash, fields_hash};
pub use orchestrator::{SyncOrchestrator, SyncSettings};
pub use status::print_status;
pub use store::{store_path, MappingStore};
pub use types::{
    ConflictReport, ConflictStrategy, Decision, PullResult, RecordMeta, SyncAction, SyncMap,
    SyncOperation, SyncOutcome, SyncRecord, SyncState, SyncStatusView,
};
