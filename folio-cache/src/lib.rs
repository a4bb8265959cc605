//! Folio Cache - Local cache layer for the Folio reading client.
//!
//! A metadata-driven, TTL- and pin-aware cache in front of a remote data
//! source. Staleness is explicit: reads return a [`CacheResult`] that the
//! caller branches on, never an exception path for an ordinary miss.
//!
//! # Design
//!
//! - Per-key async locks collapse concurrent work on one key into a
//!   single flight ([`keylock::KeyLocks`]).
//! - Background work (refresh, pin persistence, eviction sweeps) runs on
//!   a bounded-concurrency [`queue::WorkQueue`].
//! - Pin/unpin intents for uncached items are journaled durably
//!   ([`journal::PinOperationJournal`]) and replayed in order.
//! - [`orchestrator::CacheOrchestrator`] composes the pieces and is the
//!   sole boundary where storage failures turn into typed results.
//!
//! Construct one orchestrator at process start and hand clones to
//! consumers; there is no global instance.
//!
//! # Example
//!
//! ```ignore
//! use folio_cache::{CacheOrchestrator, MetadataPatch};
//! use folio_cache::store::LmdbStore;
//! use folio_core::keys::{chapter_key, CONTENT_CACHE};
//! use std::sync::Arc;
//!
//! let store = Arc::new(LmdbStore::open("/data/folio-cache", 100)?);
//! let cache = CacheOrchestrator::with_defaults(store)?;
//!
//! let key = chapter_key("b1", "v1", "c1");
//! cache.put(CONTENT_CACHE, &key, &chapter, MetadataPatch::new()).await?;
//!
//! match cache.get::<Chapter>(CONTENT_CACHE, &key).await {
//!     CacheResult::Fresh { data, .. } => render(data),
//!     CacheResult::Stale { data, .. } => render_and_refresh(data),
//!     CacheResult::Missing { .. } => fetch_from_source(),
//!     other => show_error(other),
//! }
//! ```

pub mod journal;
pub mod keylock;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod store;

pub use journal::{PendingPinOperation, PinOperation, PinOperationJournal};
pub use keylock::{KeyLockGuard, KeyLocks};
pub use metrics::{EvictionReason, MetricsCollector, MetricsSnapshot};
pub use orchestrator::{CacheOrchestrator, Fetcher, MetadataPatch};
pub use queue::{JobHandle, WorkQueue};
pub use store::{KeyValueStore, LmdbStore, LmdbStoreError, MemoryStore};

pub use folio_core::{
    CacheConfig, CacheMetadata, CacheResult, DataSource, FolioError, FolioResult,
};
