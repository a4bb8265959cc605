//! Backing-store trait.

use async_trait::async_trait;
use folio_core::FolioResult;

/// Opaque persistent key-value store with named collections.
///
/// This trait abstracts over the storage engine (LMDB on device, an
/// in-memory map in tests). Implementations must be thread-safe and
/// support concurrent access; the cache layer above never assumes any
/// ordering between operations on different keys.
///
/// # Collections
///
/// A collection is a named key→bytes map, created lazily on first use.
/// Values are opaque byte strings; serialization is the caller's concern.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, or `None` if absent.
    async fn get(&self, collection: &str, key: &str) -> FolioResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, collection: &str, key: &str, value: &[u8]) -> FolioResult<()>;

    /// Remove the value under `key`. Returns whether a value was removed.
    async fn delete(&self, collection: &str, key: &str) -> FolioResult<bool>;

    /// Remove every entry in the collection. Returns the number removed.
    async fn clear(&self, collection: &str) -> FolioResult<u64>;

    /// List the keys currently present in the collection, in ascending
    /// lexicographic order.
    async fn keys(&self, collection: &str) -> FolioResult<Vec<String>>;
}
