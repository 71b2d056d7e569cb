//! Persistence of per-tab log buffers.
//!
//! The store is a key-value collaborator keyed by `logs_<tabId>`. Every write
//! overwrites the full buffer for that tab; the buffer is read once when
//! capture starts so a restarted process picks up where it left off.

use crate::entry::LogEntry;
use crate::error::StoreError;
use crate::host::TabId;
use async_trait::async_trait;
use parking_lot::Mutex;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Storage key for a tab's log buffer.
#[must_use]
pub fn storage_key(tab: TabId) -> String {
    format!("logs_{tab}")
}

/// Key-value persistence collaborator.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Loads the persisted buffer, empty when nothing was stored.
    async fn load(&self, tab: TabId) -> Result<Vec<LogEntry>, StoreError>;

    /// Overwrites the persisted buffer.
    async fn save(&self, tab: TabId, logs: &[LogEntry]) -> Result<(), StoreError>;

    /// Deletes the persisted buffer.
    async fn remove(&self, tab: TabId) -> Result<(), StoreError>;
}

/// Process-lifetime store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<LogEntry>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a buffer is stored for `tab`.
    #[must_use]
    pub fn contains(&self, tab: TabId) -> bool {
        self.entries.lock().contains_key(&storage_key(tab))
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn load(&self, tab: TabId) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .get(&storage_key(tab))
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, tab: TabId, logs: &[LogEntry]) -> Result<(), StoreError> {
        self.entries.lock().insert(storage_key(tab), logs.to_vec());
        Ok(())
    }

    async fn remove(&self, tab: TabId) -> Result<(), StoreError> {
        self.entries.lock().remove(&storage_key(tab));
        Ok(())
    }
}

const LOGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tab_logs");

/// Durable store backed by an embedded redb database.
///
/// Values are JSON arrays of [`LogEntry`]. All database work runs on the
/// blocking pool so the async runtime is never stalled by disk I/O.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(backend)?;
        debug!(path = %path.display(), "opened log store");
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
    }
}

#[async_trait]
impl LogStore for RedbStore {
    async fn load(&self, tab: TabId) -> Result<Vec<LogEntry>, StoreError> {
        let key = storage_key(tab);
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(backend)?;
            let table = match txn.open_table(LOGS_TABLE) {
                Ok(table) => table,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(backend(e)),
            };
            match table.get(key.as_str()).map_err(backend)? {
                Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn save(&self, tab: TabId, logs: &[LogEntry]) -> Result<(), StoreError> {
        let key = storage_key(tab);
        let bytes = serde_json::to_vec(logs)?;
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(backend)?;
            {
                let mut table = txn.open_table(LOGS_TABLE).map_err(backend)?;
                table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
            }
            txn.commit().map_err(backend)
        })
        .await
    }

    async fn remove(&self, tab: TabId) -> Result<(), StoreError> {
        let key = storage_key(tab);
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(backend)?;
            {
                let mut table = txn.open_table(LOGS_TABLE).map_err(backend)?;
                table.remove(key.as_str()).map_err(backend)?;
            }
            txn.commit().map_err(backend)
        })
        .await
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{from_unix_seconds, Category, Level};

    fn sample(n: u32) -> Vec<LogEntry> {
        (0..n)
            .map(|i| {
                LogEntry::new(
                    from_unix_seconds(1_700_000_000.0 + f64::from(i)).unwrap(),
                    Level::Log,
                    Category::Log,
                    &format!("entry {i}"),
                )
            })
            .collect()
    }

    #[test]
    fn storage_key_format() {
        assert_eq!(storage_key(TabId(42)), "logs_42");
    }

    #[tokio::test]
    async fn memory_store_overwrites_and_removes() {
        let store = MemoryStore::new();
        store.save(TabId(1), &sample(3)).await.unwrap();
        store.save(TabId(1), &sample(1)).await.unwrap();
        assert_eq!(store.load(TabId(1)).await.unwrap().len(), 1);

        store.remove(TabId(1)).await.unwrap();
        assert!(!store.contains(TabId(1)));
        assert!(store.load(TabId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.redb");
        let logs = sample(4);

        {
            let store = RedbStore::open(&path).unwrap();
            assert!(store.load(TabId(5)).await.unwrap().is_empty());
            store.save(TabId(5), &logs).await.unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.load(TabId(5)).await.unwrap(), logs);
        assert!(store.load(TabId(6)).await.unwrap().is_empty());

        store.remove(TabId(5)).await.unwrap();
        assert!(store.load(TabId(5)).await.unwrap().is_empty());
    }
}
