//! Local store boundary.
//!
//! The sync engine reads work items through this trait and hands back
//! pulled copies to write. It never touches the storage format itself.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::model::WorkItem;

/// Where work items live on this machine.
pub trait LocalStore: Send + Sync {
    /// Read one item.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` if no item has this id.
    fn read_entity(&self, local_id: &str) -> Result<WorkItem>;

    /// Insert or replace an item, keeping its timestamps as given.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_entity(&self, item: &WorkItem) -> Result<()>;

    /// Every local id, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list_ids(&self) -> Result<Vec<String>>;
}

/// Store backed by a map, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    items: Mutex<BTreeMap<String, WorkItem>>,
}

impl MemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store already holding `items`.
    #[must_use]
    pub fn with_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self {
            items: Mutex::new(
                items
                    .into_iter()
                    .map(|item| (item.local_id.clone(), item))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryLocalStore {
    fn read_entity(&self, local_id: &str) -> Result<WorkItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(local_id)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound {
                id: local_id.to_string(),
            })
    }

    fn write_entity(&self, item: &WorkItem) -> Result<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.local_id.clone(), item.clone());
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}
