//! Remote item model, normalized by the adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::work_item::{ItemFields, ItemStatus};

/// Which remote tracker a record or adapter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    /// GitHub Issues
    Github,
    /// Azure DevOps Boards
    AzureDevops,
}

impl RemoteKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::AzureDevops => "azure_devops",
        }
    }

    /// Parse a provider name, accepting common spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" | "gh" => Some(Self::Github),
            "azure_devops" | "azure-devops" | "azure" | "ado" | "azdo" => Some(Self::AzureDevops),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item as seen on the remote side.
///
/// Ephemeral: produced by an adapter call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub remote_id: String,

    #[serde(flatten)]
    pub fields: ItemFields,

    /// The backend's own status string before mapping.
    pub native_status: String,

    /// Browser URL, when the backend reports one.
    pub url: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteItem {
    /// Last-modified time, falling back to creation time.
    #[must_use]
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

/// Filter for `list_items`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    /// Items must carry every one of these labels.
    pub labels: Vec<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ItemFilter {
    /// Whether an already-normalized item passes the filter.
    ///
    /// Adapters push what they can into the query and use this for the rest.
    #[must_use]
    pub fn matches(&self, item: &RemoteItem) -> bool {
        if let Some(status) = self.status {
            if item.fields.status != status {
                return false;
            }
        }
        if !self
            .labels
            .iter()
            .all(|l| item.fields.labels.iter().any(|have| have.eq_ignore_ascii_case(l)))
        {
            return false;
        }
        if let Some(since) = self.updated_since {
            if item.effective_timestamp().is_none_or(|ts| ts < since) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: ItemStatus, labels: &[&str]) -> RemoteItem {
        RemoteItem {
            remote_id: "1".into(),
            fields: ItemFields {
                title: "t".into(),
                status,
                labels: labels.iter().map(|s| (*s).to_string()).collect(),
                ..ItemFields::default()
            },
            native_status: "open".into(),
            url: None,
            created_at: None,
            updated_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_filter_by_status_and_labels() {
        let filter = ItemFilter {
            status: Some(ItemStatus::Open),
            labels: vec!["Sync".into()],
            ..ItemFilter::default()
        };
        assert!(filter.matches(&remote(ItemStatus::Open, &["sync", "x"])));
        assert!(!filter.matches(&remote(ItemStatus::Closed, &["sync"])));
        assert!(!filter.matches(&remote(ItemStatus::Open, &["x"])));
    }

    #[test]
    fn test_filter_updated_since_excludes_untimed() {
        let filter = ItemFilter {
            updated_since: Some(Utc::now() - chrono::Duration::hours(1)),
            ..ItemFilter::default()
        };
        let mut item = remote(ItemStatus::Open, &[]);
        assert!(filter.matches(&item));
        item.updated_at = None;
        assert!(!filter.matches(&item));
    }

    #[test]
    fn test_remote_kind_parse() {
        assert_eq!(RemoteKind::parse("GitHub"), Some(RemoteKind::Github));
        assert_eq!(RemoteKind::parse("ado"), Some(RemoteKind::AzureDevops));
        assert_eq!(RemoteKind::parse("jira"), None);
    }
}
