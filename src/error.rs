//! Error types for tracksync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, 5=auth, etc.)
//! - Retryability and batch-fatality flags used by the batch processor
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::batch::BatchResult;

/// Result type alias for tracksync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    DatabaseError,
    PersistenceError,

    // Not Found (exit 3)
    RemoteNotFound,
    ItemNotFound,

    // Validation (exit 4)
    ValidationFailed,
    MappingConflict,
    InvalidArgument,

    // Auth (exit 5)
    AuthFailed,

    // Remote / sync (exit 6)
    RateLimited,
    TransientFailure,
    Timeout,
    Cancelled,
    BatchAborted,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::PersistenceError => "PERSISTENCE_ERROR",
            Self::RemoteNotFound => "REMOTE_NOT_FOUND",
            Self::ItemNotFound => "ITEM_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::MappingConflict => "MAPPING_CONFLICT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::AuthFailed => "AUTH_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::BatchAborted => "BATCH_ABORTED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::PersistenceError => 2,
            Self::RemoteNotFound | Self::ItemNotFound => 3,
            Self::ValidationFailed | Self::MappingConflict | Self::InvalidArgument => 4,
            Self::AuthFailed => 5,
            Self::RateLimited
            | Self::TransientFailure
            | Self::Timeout
            | Self::Cancelled
            | Self::BatchAborted => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the failed call may succeed if issued again later.
    ///
    /// True only for the transient class: rate-limit rejections, timeouts
    /// and 5xx-style failures. Validation errors are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::TransientFailure | Self::Timeout
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tracksync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// When the remote quota window resets, if the backend said so.
        reset_at: Option<DateTime<Utc>>,
    },

    #[error("Transient remote failure: {0}")]
    Transient(String),

    #[error("Timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    /// A batch was cancelled or aborted before this call reached the remote.
    #[error("Cancelled before {operation}")]
    Cancelled { operation: String },

    #[error("Remote item not found: {id}")]
    RemoteNotFound { id: String },

    #[error("Local item not found: {id}")]
    ItemNotFound { id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Remote item {remote_id} is already mapped to {existing_local} (cannot map to {local_id})")]
    MappingConflict {
        remote_id: String,
        existing_local: String,
        local_id: String,
    },

    #[error("Failed to persist sync map at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch aborted after {} of {} items: {cause}", partial.succeeded() + partial.failed(), partial.total())]
    BatchAborted {
        cause: Box<Error>,
        partial: Box<BatchResult>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Auth(_) => ErrorCode::AuthFailed,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Transient(_) => ErrorCode::TransientFailure,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::RemoteNotFound { .. } => ErrorCode::RemoteNotFound,
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::MappingConflict { .. } => ErrorCode::MappingConflict,
            Self::Persistence { .. } => ErrorCode::PersistenceError,
            Self::BatchAborted { .. } => ErrorCode::BatchAborted,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    ///
    /// An aborted batch exits with the code of the error that caused it.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::BatchAborted { cause, .. } => cause.exit_code(),
            other => other.error_code().exit_code(),
        }
    }

    /// Whether the batch processor should retry the item after backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Whether this error makes every remaining item in a batch pointless.
    ///
    /// Bad credentials fail every call; a sync map that cannot be written
    /// would lose the mappings of everything synced afterwards.
    #[must_use]
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Persistence { .. })
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Auth(_) => Some(
                "Check the provider token: tsync config show\n  \
                 GitHub:       export GITHUB_TOKEN=...\n  \
                 Azure DevOps: export AZURE_DEVOPS_PAT=..."
                    .to_string(),
            ),

            Self::RateLimited { reset_at: Some(at), .. } => Some(format!(
                "Remote quota exhausted until {}. Lower --max-concurrent or retry later.",
                at.to_rfc3339()
            )),
            Self::RateLimited { reset_at: None, .. } => {
                Some("Remote quota exhausted. Lower --max-concurrent or retry later.".to_string())
            }

            Self::Timeout { .. } => Some(
                "Raise sync.requestTimeoutMs with `tsync config set sync.requestTimeoutMs <ms>`"
                    .to_string(),
            ),

            Self::ItemNotFound { id } => Some(format!(
                "No local item with ID '{id}'. Use `tsync item list` to see available items."
            )),

            Self::RemoteNotFound { id } => Some(format!(
                "Remote item '{id}' does not exist or is not visible with the current token."
            )),

            Self::MappingConflict { remote_id, existing_local, .. } => Some(format!(
                "'{remote_id}' already belongs to '{existing_local}'. \
                 Use `tsync status {existing_local}` to inspect the mapping."
            )),

            Self::Persistence { path, .. } => Some(format!(
                "Make sure {} is writable; no mappings were lost.",
                path.display()
            )),

            Self::Config(_) => Some(
                "Run `tsync config show` to inspect the effective configuration.".to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some(
                        "Valid statuses: backlog, open, in_progress, blocked, closed, deferred. \
                         Synonyms: done→closed, wip→in_progress, todo→open"
                            .to_string(),
                    )
                } else if msg.contains("kind") {
                    Some(
                        "Valid kinds: feature, epic, task. \
                         Synonyms: story→feature, initiative→epic, ticket→task"
                            .to_string(),
                    )
                } else if msg.contains("strategy") {
                    Some("Valid strategies: local, remote, newest, manual, merge".to_string())
                } else {
                    None
                }
            }

            Self::BatchAborted { cause, .. } => cause.hint(),

            Self::Transient(_)
            | Self::Cancelled { .. }
            | Self::Validation(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. An aborted batch also carries its partial result.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": self.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        if let Self::BatchAborted { partial, .. } = self {
            if let Ok(value) = serde_json::to_value(partial.as_ref()) {
                obj["error"]["partial"] = value;
            }
        }

        obj
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_class_is_retryable() {
        assert!(Error::Transient("502".into()).is_retryable());
        assert!(Error::RateLimited { message: "429".into(), reset_at: None }.is_retryable());
        assert!(Error::Timeout { operation: "get_item".into(), after_ms: 10 }.is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!Error::Validation("title required".into()).is_retryable());
        assert!(!Error::RemoteNotFound { id: "42".into() }.is_retryable());
        assert!(!Error::Auth("bad token".into()).is_retryable());
        assert!(!Error::Cancelled { operation: "create_item".into() }.is_retryable());
    }

    #[test]
    fn test_batch_fatal_classes() {
        assert!(Error::Auth("bad token".into()).is_batch_fatal());
        let persistence = Error::Persistence {
            path: PathBuf::from("/tmp/github.json"),
            source: std::io::Error::other("disk full"),
        };
        assert!(persistence.is_batch_fatal());
        assert!(!Error::Transient("reset".into()).is_batch_fatal());
        assert!(!Error::Validation("bad".into()).is_batch_fatal());
    }

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::Auth(String::new()).exit_code(), 5);
        assert_eq!(Error::ItemNotFound { id: "x".into() }.exit_code(), 3);
        assert_eq!(Error::Config(String::new()).exit_code(), 7);
        assert_eq!(Error::Other(String::new()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::RemoteNotFound { id: "17".into() };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "REMOTE_NOT_FOUND");
        assert_eq!(json["error"]["retryable"], false);
        assert_eq!(json["error"]["exit_code"], 3);
        assert!(json["error"]["hint"].as_str().is_some());
    }

    #[test]
    fn test_status_hint_for_invalid_argument() {
        let err = Error::InvalidArgument("unknown status 'foo'".into());
        assert!(err.hint().unwrap().contains("in_progress"));
    }
}
