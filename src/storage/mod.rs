//! Local work item storage.
//!
//! - [`local`] - the `LocalStore` boundary and an in-memory store
//! - [`schema`] - database schema definitions
//! - [`migrations`] - tracked schema migrations
//! - [`sqlite`] - SQLite store (WAL mode)

pub mod local;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use local::{LocalStore, MemoryLocalStore};
pub use sqlite::{ListFilter, SqliteLocalStore};
