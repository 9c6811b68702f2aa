//! Local work item model.
//!
//! Work items are features, epics and tasks owned by the local store.
//! The sync engine only reads them and proposes updated copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unified status vocabulary shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Backlog,
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
    Deferred,
    /// A remote value no mapping table recognizes.
    Unknown,
}

impl ItemStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Deferred => "deferred",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a canonical storage string. Anything else is `Unknown`.
    #[must_use]
    pub fn from_canonical(s: &str) -> Self {
        match s {
            "backlog" => Self::Backlog,
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "blocked" => Self::Blocked,
            "closed" => Self::Closed,
            "deferred" => Self::Deferred,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What sort of work an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Feature,
    Epic,
    #[default]
    Task,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Task => "task",
        }
    }

    /// Parse a canonical storage string, defaulting to `Task`.
    #[must_use]
    pub fn from_canonical(s: &str) -> Self {
        match s {
            "feature" => Self::Feature,
            "epic" => Self::Epic,
            _ => Self::Task,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The syncable content of an item, independent of which side holds it.
///
/// This is what gets pushed to a remote and what the content hash covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItemFields {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ItemFields {
    /// Copy with labels sorted and deduplicated, so ordering never reads as a change.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.labels.sort();
        out.labels.dedup();
        out
    }

    /// Names of the fields whose values differ between `self` and `other`.
    ///
    /// Labels compare as sets.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<&'static str> {
        let a = self.normalized();
        let b = other.normalized();
        let mut fields = Vec::new();
        if a.title != b.title {
            fields.push("title");
        }
        if a.description.as_deref().unwrap_or("") != b.description.as_deref().unwrap_or("") {
            fields.push("description");
        }
        if a.status != b.status {
            fields.push("status");
        }
        if a.assignee != b.assignee {
            fields.push("assignee");
        }
        if a.labels != b.labels {
            fields.push("labels");
        }
        if a.kind != b.kind {
            fields.push("kind");
        }
        fields
    }
}

/// A work item in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier (`wi_` + 12 hex chars)
    pub local_id: String,

    #[serde(flatten)]
    pub fields: ItemFields,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a new item with a fresh id, stamped now.
    #[must_use]
    pub fn new(title: impl Into<String>, kind: ItemKind) -> Self {
        let now = Utc::now();
        Self {
            local_id: new_local_id(),
            fields: ItemFields {
                title: title.into(),
                kind,
                ..ItemFields::default()
            },
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Last-modified time, falling back to creation time.
    #[must_use]
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

/// Mint a new local id.
#[must_use]
pub fn new_local_id() -> String {
    format!("wi_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
