//! In-memory backing store.
//!
//! Uses tokio::sync::RwLock for safe async access. Collections are
//! BTreeMaps so `keys` comes back in lexicographic order without an
//! explicit sort, matching the LMDB backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use folio_core::FolioResult;
use tokio::sync::RwLock;

use super::traits::KeyValueStore;

/// Non-persistent store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    /// Whether a collection has no entries.
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> FolioResult<Option<Vec<u8>>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: &[u8]) -> FolioResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> FolioResult<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn clear(&self, collection: &str) -> FolioResult<u64> {
        let mut collections = self.collections.write().await;
        if let Some(entries) = collections.get_mut(collection) {
            let removed = entries.len() as u64;
            entries.clear();
            Ok(removed)
        } else {
            Ok(0)
        }
    }

    async fn keys(&self, collection: &str) -> FolioResult<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }
}
