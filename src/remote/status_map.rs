//! Per-backend vocabulary tables.
//!
//! Each backend translates its native status and type strings through an
//! explicit table passed to the adapter as a value. Inbound lookups are
//! case-insensitive and fall back to a sentinel instead of failing.

use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{ItemKind, ItemStatus};

/// Two-way table between native strings and a unified enum.
#[derive(Debug, Clone)]
pub struct VocabularyMap<T> {
    inbound: HashMap<String, T>,
    outbound: HashMap<T, String>,
    fallback: T,
}

impl<T: Copy + Eq + Hash> VocabularyMap<T> {
    /// `inbound` may map several native names to one value; `outbound`
    /// picks the native name written for each value.
    #[must_use]
    pub fn new(inbound: &[(&str, T)], outbound: &[(T, &str)], fallback: T) -> Self {
        Self {
            inbound: inbound
                .iter()
                .map(|(k, v)| (k.to_lowercase(), *v))
                .collect(),
            outbound: outbound
                .iter()
                .map(|(k, v)| (*k, (*v).to_string()))
                .collect(),
            fallback,
        }
    }

    /// Translate a native value. Unrecognized values give the fallback.
    #[must_use]
    pub fn to_unified(&self, native: &str) -> T {
        self.lookup(native).unwrap_or(self.fallback)
    }

    /// Translate a native value, `None` when unrecognized.
    #[must_use]
    pub fn lookup(&self, native: &str) -> Option<T> {
        self.inbound.get(&native.trim().to_lowercase()).copied()
    }

    /// Every native value (lowercased, sorted) that reads as `value`.
    #[must_use]
    pub fn natives_for(&self, value: T) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .inbound
            .iter()
            .filter(|(_, v)| **v == value)
            .map(|(k, _)| k.as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Native value to write for `value`, if the backend has one.
    #[must_use]
    pub fn to_native(&self, value: T) -> Option<&str> {
        self.outbound.get(&value).map(String::as_str)
    }
}

pub type StatusMap = VocabularyMap<ItemStatus>;
pub type KindMap = VocabularyMap<ItemKind>;

/// GitHub status names: the issue `state` plus the suffix of `status:*` labels.
#[must_use]
pub fn github_status_map() -> StatusMap {
    StatusMap::new(
        &[
            ("open", ItemStatus::Open),
            ("closed", ItemStatus::Closed),
            ("backlog", ItemStatus::Backlog),
            ("in-progress", ItemStatus::InProgress),
            ("in_progress", ItemStatus::InProgress),
            ("blocked", ItemStatus::Blocked),
            ("deferred", ItemStatus::Deferred),
        ],
        &[
            (ItemStatus::Open, "open"),
            (ItemStatus::Closed, "closed"),
            (ItemStatus::Backlog, "backlog"),
            (ItemStatus::InProgress, "in-progress"),
            (ItemStatus::Blocked, "blocked"),
            (ItemStatus::Deferred, "deferred"),
        ],
        ItemStatus::Unknown,
    )
}

/// GitHub kinds, from the suffix of `type:*` labels.
#[must_use]
pub fn github_kind_map() -> KindMap {
    KindMap::new(
        &[
            ("feature", ItemKind::Feature),
            ("story", ItemKind::Feature),
            ("enhancement", ItemKind::Feature),
            ("epic", ItemKind::Epic),
            ("task", ItemKind::Task),
            ("bug", ItemKind::Task),
        ],
        &[
            (ItemKind::Feature, "feature"),
            (ItemKind::Epic, "epic"),
            (ItemKind::Task, "task"),
        ],
        ItemKind::Task,
    )
}

/// Azure DevOps `System.State` values.
#[must_use]
pub fn azure_status_map() -> StatusMap {
    StatusMap::new(
        &[
            ("Proposed", ItemStatus::Backlog),
            ("New", ItemStatus::Open),
            ("Active", ItemStatus::InProgress),
            ("Blocked", ItemStatus::Blocked),
            ("Resolved", ItemStatus::Closed),
            ("Closed", ItemStatus::Closed),
            ("Removed", ItemStatus::Deferred),
        ],
        &[
            (ItemStatus::Backlog, "Proposed"),
            (ItemStatus::Open, "New"),
            (ItemStatus::InProgress, "Active"),
            (ItemStatus::Blocked, "Blocked"),
            (ItemStatus::Closed, "Closed"),
            (ItemStatus::Deferred, "Removed"),
        ],
        ItemStatus::Unknown,
    )
}

/// Azure DevOps `System.WorkItemType` values.
///
/// `task_type` is the type created for plain tasks (process templates differ).
#[must_use]
pub fn azure_kind_map(task_type: &str) -> KindMap {
    KindMap::new(
        &[
            ("Epic", ItemKind::Epic),
            ("Feature", ItemKind::Feature),
            ("User Story", ItemKind::Feature),
            ("Task", ItemKind::Task),
            ("Product Backlog Item", ItemKind::Task),
            ("Bug", ItemKind::Task),
            ("Issue", ItemKind::Task),
        ],
        &[
            (ItemKind::Epic, "Epic"),
            (ItemKind::Feature, "Feature"),
            (ItemKind::Task, task_type),
        ],
        ItemKind::Task,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_maps_to_unknown() {
        assert_eq!(azure_status_map().to_unified("Triaged"), ItemStatus::Unknown);
        assert_eq!(github_status_map().to_unified("needs-review"), ItemStatus::Unknown);
        assert!(azure_status_map().lookup("Triaged").is_none());
    }

    #[test]
    fn test_azure_states() {
        let map = azure_status_map();
        assert_eq!(map.to_unified("Proposed"), ItemStatus::Backlog);
        assert_eq!(map.to_unified("active"), ItemStatus::InProgress);
        assert_eq!(map.to_unified("Resolved"), ItemStatus::Closed);
        assert_eq!(map.to_unified("Removed"), ItemStatus::Deferred);
        assert_eq!(map.to_native(ItemStatus::Closed), Some("Closed"));
        assert_eq!(map.to_native(ItemStatus::Unknown), None);
        assert_eq!(map.natives_for(ItemStatus::Closed), vec!["closed", "resolved"]);
    }

    #[test]
    fn test_azure_kinds() {
        let map = azure_kind_map("Product Backlog Item");
        assert_eq!(map.to_unified("User Story"), ItemKind::Feature);
        assert_eq!(map.to_unified("Bug"), ItemKind::Task);
        assert_eq!(map.to_unified("Impediment"), ItemKind::Task);
        assert_eq!(map.to_native(ItemKind::Task), Some("Product Backlog Item"));
    }

    #[test]
    fn test_github_labels() {
        let status = github_status_map();
        assert_eq!(status.to_unified("in-progress"), ItemStatus::InProgress);
        assert_eq!(status.to_native(ItemStatus::InProgress), Some("in-progress"));
        assert_eq!(github_kind_map().to_unified("story"), ItemKind::Feature);
    }
}
