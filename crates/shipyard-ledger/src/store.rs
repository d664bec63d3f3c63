//! LedgerStore: redb-backed task ledger.
//!
//! All records live in one table and are JSON-serialized into redb's
//! `&[u8]` value column. The store supports both on-disk and in-memory
//! backends (the latter for testing and dry runs).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::tables::TASKS;
use crate::types::*;
use crate::Ledger;

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// Thread-safe ledger backed by redb.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "ledger opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory ledger.
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory ledger opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl Ledger for LedgerStore {
    fn get(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<Option<TaskRecord>> {
        let key = task_key(namespace, kind, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TaskRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put(&self, record: &TaskRecord) -> LedgerResult<()> {
        let key = record.table_key();
        let mut record = record.clone();
        record.updated_at = epoch_secs();
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = %record.status, "task record stored");
        Ok(())
    }

    fn list(&self, namespace: &str) -> LedgerResult<Vec<TaskRecord>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: TaskRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    fn delete(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<bool> {
        let key = task_key(namespace, kind, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "task record deleted");
        Ok(existed)
    }
}
