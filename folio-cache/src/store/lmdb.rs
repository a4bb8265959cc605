//! LMDB-backed store implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) with one named database
//! per collection, created lazily on first use. LMDB provides ACID
//! transactions: read transactions for `get`/`keys`, write transactions
//! for `put`/`delete`/`clear`.
//!
//! # Self-healing open
//!
//! A box that fails to open (corrupt environment, incompatible map) is
//! deleted and recreated. That loses the cached data but restores service
//! without user intervention; the recovery is logged as severe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use folio_core::{FolioError, FolioResult, StoreError};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::traits::KeyValueStore;

/// Maximum number of named databases in one environment.
const MAX_DBS: u32 = 16;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a named database within the environment.
    #[error("Failed to open database {collection}: {reason}")]
    DbOpen { collection: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The database-handle map was poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    Poisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for FolioError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::EnvOpen(reason) => {
                FolioError::Store(StoreError::Unavailable { reason })
            }
            LmdbStoreError::DbOpen { collection, reason } => {
                FolioError::Store(StoreError::Unavailable {
                    reason: format!("{}: {}", collection, reason),
                })
            }
            other => FolioError::Store(StoreError::TransactionFailed {
                reason: other.to_string(),
            }),
        }
    }
}

/// LMDB-backed key-value store with named collections.
///
/// # Example
///
/// ```ignore
/// use folio_cache::store::{KeyValueStore, LmdbStore};
///
/// let store = LmdbStore::open("/data/folio-cache", 100)?;
/// store.put("books_cache", "b1", &bytes).await?;
/// let cached = store.get("books_cache", "b1").await?;
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// Named database handles, opened lazily per collection.
    databases: RwLock<HashMap<String, Database<Str, Bytes>>>,
    /// Environment directory, kept for diagnostics.
    path: PathBuf,
}

impl LmdbStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files are stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error only when the environment cannot be opened even
    /// after deleting and recreating the directory.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let env = match Self::open_env(&path, max_size_mb) {
            Ok(env) => env,
            Err(first) => {
                tracing::error!(
                    path = %path.display(),
                    error = %first,
                    "LMDB environment failed to open, deleting and recreating"
                );
                std::fs::remove_dir_all(&path)?;
                std::fs::create_dir_all(&path)?;
                Self::open_env(&path, max_size_mb)
                    .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?
            }
        };

        Ok(Self {
            env,
            databases: RwLock::new(HashMap::new()),
            path,
        })
    }

    fn open_env(path: &Path, max_size_mb: usize) -> Result<Env, heed::Error> {
        unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(MAX_DBS)
                .open(path)
        }
    }

    /// The environment directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the named database for `collection`, creating it on first use.
    fn database(&self, collection: &str) -> Result<Database<Str, Bytes>, LmdbStoreError> {
        if let Some(db) = self
            .databases
            .read()
            .map_err(|_| LmdbStoreError::Poisoned)?
            .get(collection)
        {
            return Ok(*db);
        }

        let mut databases = self
            .databases
            .write()
            .map_err(|_| LmdbStoreError::Poisoned)?;
        if let Some(db) = databases.get(collection) {
            return Ok(*db);
        }

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let db: Database<Str, Bytes> = self
            .env
            .create_database(&mut wtxn, Some(collection))
            .map_err(|e| LmdbStoreError::DbOpen {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        databases.insert(collection.to_string(), db);
        Ok(db)
    }
}

#[async_trait]
impl KeyValueStore for LmdbStore {
    async fn get(&self, collection: &str, key: &str) -> FolioResult<Option<Vec<u8>>> {
        let db = self.database(collection)?;
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let value = db
            .get(&rtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    async fn put(&self, collection: &str, key: &str, value: &[u8]) -> FolioResult<()> {
        let db = self.database(collection)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        db.put(&mut wtxn, key, value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> FolioResult<bool> {
        let db = self.database(collection)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let deleted = db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(deleted)
    }

    async fn clear(&self, collection: &str) -> FolioResult<u64> {
        let db = self.database(collection)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let count = db
            .len(&wtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        db.clear(&mut wtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(count)
    }

    async fn keys(&self, collection: &str) -> FolioResult<Vec<String>> {
        let db = self.database(collection)?;
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        let iter = db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        for result in iter {
            let (key, _) = result.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}
