//! ACID-durable document store backed by redb.
//!
//! One table maps document names to JSON bytes. Every write is its own
//! transaction, so a crash leaves either the old or the new document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::error::StoreError;
use crate::store::StoreResult;

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "histograph.redb";

/// Document name → serialized document.
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

fn redb_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb {
        message: format!("{context} failed: {e}"),
    }
}

/// ACID-durable store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl DurableStore {
    /// Open or create the store in `data_dir`, creating the directory and the
    /// documents table as needed.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let path = data_dir.join(DATABASE_FILE);
        let db = Database::create(&path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        let txn = db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.open_table(DOCUMENTS)
            .map_err(|e| redb_err("open_table", e))?;
        txn.commit().map_err(|e| redb_err("commit", e))?;

        tracing::info!(path = %path.display(), "opened durable store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a document, replacing any previous version.
    pub fn put(&self, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(DOCUMENTS)
                .map_err(|e| redb_err("open_table", e))?;
            table
                .insert(name, bytes)
                .map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    /// Read a document. Returns `Ok(None)` if it was never written.
    pub fn get(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(DOCUMENTS)
            .map_err(|e| redb_err("open_table", e))?;
        let result = table.get(name).map_err(|e| redb_err("get", e))?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    /// Delete a document. Returns whether it existed.
    pub fn remove(&self, name: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        let existed = {
            let mut table = txn
                .open_table(DOCUMENTS)
                .map_err(|e| redb_err("open_table", e))?;
            let result = table.remove(name).map_err(|e| redb_err("remove", e))?;
            result.is_some()
        };
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(existed)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .finish()
    }
}
