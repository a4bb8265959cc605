//! End-to-end cache scenarios over the LMDB backend.
//!
//! The per-module unit tests cover each component against the in-memory
//! store; these scenarios run the orchestrated whole against a real LMDB
//! environment, including restart behavior.

use std::sync::Arc;
use std::time::Duration;

use folio_cache::store::LmdbStore;
use folio_cache::{
    CacheConfig, CacheOrchestrator, CacheResult, DataSource, EvictionReason, MetadataPatch,
};
use folio_core::keys::{chapter_key, volume_key, BOOKS_CACHE, CONTENT_CACHE, HEADINGS_CACHE};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Chapter {
    title: String,
    paragraphs: Vec<String>,
}

fn make_chapter(title: &str) -> Chapter {
    Chapter {
        title: title.to_string(),
        paragraphs: vec!["first".to_string(), "second".to_string()],
    }
}

fn open_cache(dir: &TempDir) -> CacheOrchestrator<LmdbStore> {
    let store = LmdbStore::open(dir.path(), 10).expect("store open should succeed");
    CacheOrchestrator::with_defaults(Arc::new(store))
        .expect("orchestrator creation should succeed")
}

#[tokio::test]
async fn test_read_write_lifecycle_over_lmdb() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let cache = open_cache(&dir);
    let key = chapter_key("b1", "v1", "c1");
    let chapter = make_chapter("Opening");

    let missing: CacheResult<Chapter> = cache.get(CONTENT_CACHE, &key).await;
    assert!(missing.is_missing());

    cache
        .put(
            CONTENT_CACHE,
            &key,
            &chapter,
            MetadataPatch::new()
                .with_language("ar")
                .with_direction("rtl")
                .with_content_hash("h1"),
        )
        .await
        .expect("put should succeed");

    let fresh: CacheResult<Chapter> = cache.get(CONTENT_CACHE, &key).await;
    assert!(fresh.is_fresh());
    assert_eq!(fresh.data(), Some(&chapter));

    let metadata = fresh.metadata().expect("fresh carries metadata");
    assert_eq!(metadata.language.as_deref(), Some("ar"));
    assert_eq!(metadata.direction.as_deref(), Some("rtl"));
    assert_eq!(metadata.content_hash.as_deref(), Some("h1"));
    assert_eq!(metadata.source, DataSource::Network);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.writes, 1);
}

#[tokio::test]
async fn test_entries_and_pins_survive_restart() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let key = volume_key("b1", "v1");

    {
        let cache = open_cache(&dir);
        cache
            .put(
                HEADINGS_CACHE,
                &key,
                &make_chapter("headings"),
                MetadataPatch::new().with_ttl(Duration::from_millis(10)),
            )
            .await
            .expect("put should succeed");
        cache
            .pin(HEADINGS_CACHE, &key)
            .await
            .expect("pin should succeed");
        // Journal an intent for an item that is not cached yet.
        cache
            .pin(BOOKS_CACHE, "b2")
            .await
            .expect("pin should succeed");
        cache.work_queue().on_all_complete().await;
    }

    // Reopen: the pinned entry is still served fresh despite its tiny TTL,
    // and the journaled intent is still pending.
    sleep(Duration::from_millis(30)).await;
    let cache = open_cache(&dir);

    let result: CacheResult<Chapter> = cache.get(HEADINGS_CACHE, &key).await;
    assert!(result.is_fresh());
    assert!(result.metadata().expect("metadata").is_pinned);

    let pending = cache
        .pending_pin_operations()
        .await
        .expect("pending should succeed");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].item_key, "b2");

    // Once the book arrives, draining applies the old intent.
    cache
        .put(BOOKS_CACHE, "b2", &make_chapter("b2"), MetadataPatch::new())
        .await
        .expect("put should succeed");
    let applied = cache
        .drain_pending_pins()
        .await
        .expect("drain should succeed");
    assert_eq!(applied, 1);

    let book: CacheResult<Chapter> = cache.get(BOOKS_CACHE, "b2").await;
    assert!(book.metadata().expect("metadata").is_pinned);
}

#[tokio::test]
async fn test_scheduled_sweep_respects_pins() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let cache = open_cache(&dir);
    let short = MetadataPatch::new().with_ttl(Duration::from_millis(10));

    cache
        .put(BOOKS_CACHE, "doomed", &make_chapter("doomed"), short.clone())
        .await
        .expect("put should succeed");
    cache
        .put(
            BOOKS_CACHE,
            "kept",
            &make_chapter("kept"),
            short.with_pinned(true),
        )
        .await
        .expect("put should succeed");

    sleep(Duration::from_millis(30)).await;

    let handle = cache.schedule_expired_sweep(BOOKS_CACHE);
    let evicted = handle
        .join()
        .await
        .expect("job should succeed")
        .expect("sweep should succeed");
    assert_eq!(evicted, 1);

    let kept: CacheResult<Chapter> = cache.get(BOOKS_CACHE, "kept").await;
    assert!(kept.is_fresh());
    let doomed: CacheResult<Chapter> = cache.get(BOOKS_CACHE, "doomed").await;
    assert!(doomed.is_missing());
    assert_eq!(cache.stats().evictions_ttl, 1);
}

#[tokio::test]
async fn test_manual_evict_is_the_only_way_to_remove_a_pin() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let cache = open_cache(&dir);

    cache
        .put(
            BOOKS_CACHE,
            "b1",
            &make_chapter("b1"),
            MetadataPatch::new().with_pinned(true),
        )
        .await
        .expect("put should succeed");

    assert!(!cache
        .evict(BOOKS_CACHE, "b1", EvictionReason::Capacity)
        .await
        .expect("evict should succeed"));
    assert!(!cache
        .evict(BOOKS_CACHE, "b1", EvictionReason::TtlExpired)
        .await
        .expect("evict should succeed"));
    assert!(cache
        .evict(BOOKS_CACHE, "b1", EvictionReason::Manual)
        .await
        .expect("evict should succeed"));

    let result: CacheResult<Chapter> = cache.get(BOOKS_CACHE, "b1").await;
    assert!(result.is_missing());
}

#[tokio::test]
async fn test_capacity_budget_from_config() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let store = LmdbStore::open(dir.path(), 10).expect("store open should succeed");
    let cache = CacheOrchestrator::new(
        Arc::new(store),
        CacheConfig::new().with_max_collection_bytes(1),
    )
    .expect("orchestrator creation should succeed");

    cache
        .put(CONTENT_CACHE, "a", &make_chapter("a"), MetadataPatch::new())
        .await
        .expect("put should succeed");
    sleep(Duration::from_millis(10)).await;
    cache
        .put(CONTENT_CACHE, "b", &make_chapter("b"), MetadataPatch::new())
        .await
        .expect("put should succeed");

    let evicted = cache
        .sweep_capacity(CONTENT_CACHE)
        .await
        .expect("sweep should succeed");
    assert_eq!(evicted, 2);
    assert_eq!(cache.stats().evictions_capacity, 2);
}
