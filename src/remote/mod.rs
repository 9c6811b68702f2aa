//! Remote tracker backends.
//!
//! - [`adapter`] - the `RemoteAdapter` trait and its boxed form
//! - [`github`] - GitHub Issues
//! - [`azure`] - Azure DevOps Boards
//! - [`memory`] - in-memory tracker for tests
//! - [`status_map`] - per-backend vocabulary tables
//! - [`http`] - response classification shared by the HTTP backends

pub mod adapter;
pub mod azure;
pub mod factory;
pub mod github;
pub mod http;
pub mod memory;
pub mod status_map;

pub use adapter::{BoxedAdapter, RateLimitInfo, RemoteAdapter};
pub use factory::create_adapter;
pub use memory::{AdapterCall, FailureKind, MemoryAdapter};
