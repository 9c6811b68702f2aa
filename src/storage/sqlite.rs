//! SQLite-backed local store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::{ItemFields, ItemKind, ItemStatus, WorkItem};
use crate::storage::local::LocalStore;
use crate::storage::schema::apply_schema;

const COLUMNS: &str =
    "id, kind, title, description, status, assignee, labels, created_at, updated_at";

/// SQLite local store.
///
/// The connection sits behind a mutex so the store can be shared with
/// async workers.
#[derive(Debug)]
pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
}

/// Filters for [`SqliteLocalStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<ItemStatus>,
    pub kind: Option<ItemKind>,
    pub limit: Option<u32>,
}

impl SqliteLocalStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the connection
    /// fails or the schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get an item by id, `None` if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, local_id: &str) -> Result<Option<WorkItem>> {
        let conn = self.conn();
        let sql = format!("SELECT {COLUMNS} FROM work_items WHERE id = ?1");
        let item = conn
            .query_row(&sql, [local_id], map_work_item_row)
            .optional()?;
        Ok(item)
    }

    /// List items, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<WorkItem>> {
        let mut sql = format!("SELECT {COLUMNS} FROM work_items WHERE 1 = 1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        if let Some(kind) = filter.kind {
            params.push(Box::new(kind.as_str()));
            sql.push_str(&format!(" AND kind = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");
        if let Some(limit) = filter.limit {
            params.push(Box::new(limit));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            map_work_item_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Number of stored items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

impl LocalStore for SqliteLocalStore {
    fn read_entity(&self, local_id: &str) -> Result<WorkItem> {
        self.get(local_id)?.ok_or_else(|| Error::ItemNotFound {
            id: local_id.to_string(),
        })
    }

    fn write_entity(&self, item: &WorkItem) -> Result<()> {
        let fields = item.fields.normalized();
        let labels = serde_json::to_string(&fields.labels)?;
        self.conn().execute(
            "INSERT INTO work_items (id, kind, title, description, status, assignee, labels, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                assignee = excluded.assignee,
                labels = excluded.labels,
                created_at = COALESCE(work_items.created_at, excluded.created_at),
                updated_at = excluded.updated_at",
            rusqlite::params![
                item.local_id,
                fields.kind.as_str(),
                fields.title,
                fields.description,
                fields.status.as_str(),
                fields.assignee,
                labels,
                item.created_at.map(|t| t.timestamp_millis()),
                item.updated_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM work_items ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn map_work_item_row(row: &rusqlite::Row) -> rusqlite::Result<WorkItem> {
    let kind: String = row.get(1)?;
    let status: String = row.get(4)?;
    let labels: String = row.get(6)?;
    Ok(WorkItem {
        local_id: row.get(0)?,
        fields: ItemFields {
            title: row.get(2)?,
            description: row.get(3)?,
            status: ItemStatus::from_canonical(&status),
            kind: ItemKind::from_canonical(&kind),
            assignee: row.get(5)?,
            labels: serde_json::from_str(&labels).unwrap_or_default(),
        },
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn item(title: &str, status: ItemStatus) -> WorkItem {
        let mut item = WorkItem::new(title, ItemKind::Task);
        item.fields.status = status;
        item.fields.labels = vec!["sync".into(), "api".into()];
        item
    }

    #[test]
    fn test_write_and_read() {
        let store = SqliteLocalStore::open_memory().unwrap();
        let mut original = item("Persist me", ItemStatus::InProgress);
        original.fields.description = Some("body".into());
        original.updated_at = Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap());
        store.write_entity(&original).unwrap();

        let read = store.read_entity(&original.local_id).unwrap();
        assert_eq!(read.fields.title, "Persist me");
        assert_eq!(read.fields.status, ItemStatus::InProgress);
        assert_eq!(read.fields.labels, vec!["api", "sync"]);
        assert_eq!(read.updated_at, original.updated_at);
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let store = SqliteLocalStore::open_memory().unwrap();
        let mut original = item("v1", ItemStatus::Open);
        store.write_entity(&original).unwrap();
        let created = store.read_entity(&original.local_id).unwrap().created_at;

        original.fields.title = "v2".into();
        original.created_at = None;
        store.write_entity(&original).unwrap();

        let read = store.read_entity(&original.local_id).unwrap();
        assert_eq!(read.fields.title, "v2");
        assert_eq!(read.created_at, created);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_missing_item() {
        let store = SqliteLocalStore::open_memory().unwrap();
        assert!(store.get("wi_nope").unwrap().is_none());
        assert!(matches!(
            store.read_entity("wi_nope"),
            Err(Error::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_list_filters() {
        let store = SqliteLocalStore::open_memory().unwrap();
        store.write_entity(&item("a", ItemStatus::Open)).unwrap();
        store.write_entity(&item("b", ItemStatus::Closed)).unwrap();
        let mut epic = item("c", ItemStatus::Open);
        epic.fields.kind = ItemKind::Epic;
        store.write_entity(&epic).unwrap();

        let open = store
            .list(&ListFilter {
                status: Some(ItemStatus::Open),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(open.len(), 2);

        let epics = store
            .list(&ListFilter {
                kind: Some(ItemKind::Epic),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(epics.len(), 1);
        assert_eq!(epics[0].fields.title, "c");

        let limited = store
            .list(&ListFilter {
                limit: Some(1),
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(store.list_ids().unwrap().len(), 3);
    }

    #[test]
    fn test_open_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("tracksync.db");
        {
            let store = SqliteLocalStore::open(&path).unwrap();
            store.write_entity(&item("x", ItemStatus::Open)).unwrap();
        }
        let reopened = SqliteLocalStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
