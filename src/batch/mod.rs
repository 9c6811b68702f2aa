//! Batch execution of sync operations.
//!
//! - [`processor`] - worker pool, coordinator and fatal-abort handling
//! - [`throttle`] - shared rate gate
//! - [`retry`] - exponential backoff
//! - [`options`] - run options and progress events
//! - [`result`] - the batch summary

pub mod options;
pub mod processor;
pub mod result;
pub mod retry;
pub mod throttle;

pub use options::{BatchOptions, ProgressEvent, ProgressFn, RateLimitOptions};
pub use processor::{plan, BatchProcessor};
pub use result::{BatchResult, ItemError};
pub use retry::{backoff_delay, retry_with_backoff};
pub use throttle::RateGate;
