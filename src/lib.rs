//! tracksync - bidirectional sync between a local work-item store and
//! remote issue trackers.
//!
//! This crate provides the core functionality for the `tsync` CLI tool.
//!
//! # Architecture
//!
//! - [`remote`] - Remote adapter trait, GitHub and Azure DevOps backends
//! - [`sync`] - Mapping store, conflict resolution and the sync orchestrator
//! - [`batch`] - Bounded-concurrency batch runs with rate limiting and retries
//! - [`storage`] - SQLite local work-item store
//! - [`model`] - Work items and remote items
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
