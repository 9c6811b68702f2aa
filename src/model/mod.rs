//! Data models for tracksync.
//!
//! - `WorkItem` / `ItemFields`: local features, epics and tasks
//! - `RemoteItem`: the same content as normalized from a remote tracker
//! - `ItemStatus` / `ItemKind`: the unified vocabularies

pub mod remote;
pub mod work_item;

pub use remote::{ItemFilter, RemoteItem, RemoteKind};
pub use work_item::{new_local_id, ItemFields, ItemKind, ItemStatus, WorkItem};
