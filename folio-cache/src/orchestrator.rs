//! Cache orchestration.
//!
//! `CacheOrchestrator` composes the backing store, per-key locks, the
//! background work queue, the pin journal and the metrics collector. It
//! owns every metadata mutation: all writes for a key happen while holding
//! that key's lock, which is what makes access-count updates and pin flips
//! safe under concurrent readers.
//!
//! It is also the sole error-translation boundary: `get` classifies every
//! outcome into a [`CacheResult`] and never lets a storage error escape as
//! a raw `Err`. The orchestrator does not fetch on its own - a miss or a
//! stale classification is returned to the caller (or to a scheduled
//! [`CacheOrchestrator::refresh`] job), which decides refresh policy.

use std::sync::Arc;

use async_trait::async_trait;
use folio_core::keys::{BOOKS_CACHE, CONTENT_CACHE, HEADINGS_CACHE, SEARCH_CACHE};
use folio_core::{
    CacheConfig, CacheMetadata, CacheResult, DataSource, FolioError, FolioResult, StoreError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::journal::{PendingPinOperation, PinOperation, PinOperationJournal};
use crate::keylock::KeyLocks;
use crate::metrics::{EvictionReason, MetricsCollector, MetricsSnapshot};
use crate::queue::{JobHandle, WorkQueue};
use crate::store::KeyValueStore;

/// Data collections searched when replaying journaled pin operations.
const DATA_COLLECTIONS: [&str; 4] =
    [BOOKS_CACHE, HEADINGS_CACHE, CONTENT_CACHE, SEARCH_CACHE];

/// Persisted record: metadata and payload serialized together so a write
/// can never tear them apart.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    metadata: CacheMetadata,
    payload: Value,
}

/// Caller-supplied metadata overrides for a `put`.
///
/// Unset fields fall back to computed defaults (`created_at = now`, TTL
/// from config, size from the serialized payload). The pin flag of an
/// existing entry survives a re-put unless `pinned` is set explicitly.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    /// TTL override for this entry.
    pub ttl: Option<std::time::Duration>,
    /// Content language tag.
    pub language: Option<String>,
    /// Text direction tag.
    pub direction: Option<String>,
    /// Provenance override (defaults to `Network` on put).
    pub source: Option<DataSource>,
    /// Producer-supplied content hash.
    pub content_hash: Option<String>,
    /// Extension properties, stored verbatim.
    pub properties: Option<Map<String, Value>>,
    /// Explicit pin state.
    pub pinned: Option<bool>,
}

impl MetadataPatch {
    /// An empty patch: every field takes its computed default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL override.
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the direction tag.
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    /// Set the provenance.
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set the extension properties.
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set the pin state explicitly.
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }
}

/// External data source for refresh and prefetch jobs.
///
/// The cache never constructs remote queries itself; refresh policy hands
/// it a fetcher and the orchestrator takes care of single-flight and
/// write-back.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Fetch the value for `key`, or `None` if the source has no record.
    async fn fetch(&self, key: &str) -> FolioResult<Option<T>>;
}

/// Coordinates all cache reads, writes, pins and evictions.
///
/// Construct one instance at process start and hand clones to consumers;
/// clones share the same store, locks, queue, journal and metrics.
pub struct CacheOrchestrator<S: KeyValueStore> {
    store: Arc<S>,
    locks: Arc<KeyLocks>,
    queue: Arc<WorkQueue>,
    journal: Arc<PinOperationJournal<S>>,
    metrics: Arc<MetricsCollector>,
    config: CacheConfig,
}

impl<S: KeyValueStore> Clone for CacheOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            queue: Arc::clone(&self.queue),
            journal: Arc::clone(&self.journal),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyValueStore + 'static> CacheOrchestrator<S> {
    /// Create an orchestrator over `store`.
    ///
    /// Validates the config and starts the background work queue, so this
    /// must run inside a tokio runtime.
    pub fn new(store: Arc<S>, config: CacheConfig) -> FolioResult<Self> {
        config.validate()?;
        let journal = Arc::new(PinOperationJournal::new(Arc::clone(&store)));
        Ok(Self {
            store,
            locks: Arc::new(KeyLocks::new()),
            queue: Arc::new(WorkQueue::new(config.max_concurrent_jobs)),
            journal,
            metrics: Arc::new(MetricsCollector::new()),
            config,
        })
    }

    /// Create an orchestrator with the default configuration.
    pub fn with_defaults(store: Arc<S>) -> FolioResult<Self> {
        Self::new(store, CacheConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The background work queue.
    pub fn work_queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Current metrics snapshot.
    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Journaled pin operations not yet applied, in enqueue order.
    pub async fn pending_pin_operations(&self) -> FolioResult<Vec<PendingPinOperation>> {
        self.journal.pending().await
    }

    fn lock_key(collection: &str, key: &str) -> String {
        format!("{}/{}", collection, key)
    }

    /// Classify the entry under `key`.
    ///
    /// Fresh entries have their access count bumped under the key lock
    /// before being returned. Stale entries are returned as-is; refresh is
    /// the caller's decision. Absent keys and corrupt records classify as
    /// `Missing`; storage failures become `CacheResult::Error`.
    pub async fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> CacheResult<T> {
        let _guard = self.locks.acquire(&Self::lock_key(collection, key)).await;
        match self.classify_locked::<T>(collection, key).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    collection,
                    key,
                    error = %e,
                    "Cache read failed"
                );
                CacheResult::error(e, None, None)
            }
        }
    }

    /// Read and classify while the key lock is held.
    async fn classify_locked<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> FolioResult<CacheResult<T>> {
        let Some(bytes) = self.store.get(collection, key).await? else {
            self.metrics.record_miss();
            if self.config.log_operations {
                tracing::debug!(collection, key, "cache miss");
            }
            return Ok(CacheResult::missing(None));
        };

        let envelope = match serde_json::from_slice::<CacheEnvelope>(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => return self.drop_corrupt(collection, key, e.to_string()).await,
        };
        let payload = envelope.payload;
        let data = match serde_json::from_value::<T>(payload.clone()) {
            Ok(data) => data,
            Err(e) => return self.drop_corrupt(collection, key, e.to_string()).await,
        };

        if envelope.metadata.is_expired() {
            self.metrics.record_stale_hit();
            if self.config.log_operations {
                tracing::debug!(
                    collection,
                    key,
                    age_ms = envelope.metadata.age().as_millis() as u64,
                    "cache stale"
                );
            }
            return Ok(CacheResult::stale(data, envelope.metadata, None));
        }

        let bumped = envelope.metadata.with_incremented_access();
        // A failed stats write-back must not fail a successful read.
        if let Err(e) = self
            .write_envelope_raw(collection, key, &bumped, &payload)
            .await
        {
            tracing::warn!(collection, key, error = %e, "Access-stat write-back failed");
        }

        self.metrics.record_hit();
        if self.config.log_operations {
            tracing::debug!(
                collection,
                key,
                access_count = bumped.access_count,
                "cache hit"
            );
        }
        Ok(CacheResult::fresh(data, bumped))
    }

    /// Remove a record that no longer deserializes and report a miss.
    async fn drop_corrupt<T>(
        &self,
        collection: &str,
        key: &str,
        reason: String,
    ) -> FolioResult<CacheResult<T>> {
        tracing::warn!(collection, key, %reason, "Dropping corrupt cache record");
        self.store.delete(collection, key).await?;
        self.metrics.record_miss();
        Ok(CacheResult::missing(Some(
            StoreError::Serialization {
                key: key.to_string(),
                reason,
            }
            .into(),
        )))
    }

    /// Store `value` under `key`, merging `patch` over computed defaults.
    pub async fn put<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
        patch: MetadataPatch,
    ) -> FolioResult<()> {
        let payload = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let _guard = self.locks.acquire(&Self::lock_key(collection, key)).await;
        let existing = self.read_metadata(collection, key).await?;
        self.write_entry_locked(collection, key, payload, patch, DataSource::Network, existing)
            .await?;
        Ok(())
    }

    /// Flip the pin flag on, journaling the intent if the item is not
    /// cached yet.
    pub async fn pin(&self, collection: &str, key: &str) -> FolioResult<()> {
        self.set_pinned(collection, key, true).await
    }

    /// Flip the pin flag off, journaling the intent if the item is not
    /// cached yet.
    pub async fn unpin(&self, collection: &str, key: &str) -> FolioResult<()> {
        self.set_pinned(collection, key, false).await
    }

    async fn set_pinned(&self, collection: &str, key: &str, pinned: bool) -> FolioResult<()> {
        {
            let _guard = self.locks.acquire(&Self::lock_key(collection, key)).await;
            if let Some(envelope) = self.read_envelope(collection, key).await? {
                let metadata = envelope.metadata.with_pinned(pinned);
                self.write_envelope_raw(collection, key, &metadata, &envelope.payload)
                    .await?;
                if self.config.log_operations {
                    tracing::debug!(collection, key, pinned, "pin flag updated");
                }
                return Ok(());
            }
        }

        // Not cached yet: journal the intent and let a background drain
        // apply it once the item lands in the cache. Pin is
        // fire-and-forget from the caller's perspective.
        let op = if pinned {
            PendingPinOperation::pin(key)
        } else {
            PendingPinOperation::unpin(key)
        };
        self.journal.enqueue(&op).await?;
        self.metrics.record_pin_op_enqueued();
        if self.config.log_operations {
            tracing::debug!(key, pinned, "pin intent journaled");
        }
        self.schedule_journal_drain();
        Ok(())
    }

    /// Remove an entry, recording the eviction reason.
    ///
    /// Pinned entries are only removable with `EvictionReason::Manual`;
    /// for any policy-driven reason the entry is skipped and `false`
    /// returned.
    pub async fn evict(
        &self,
        collection: &str,
        key: &str,
        reason: EvictionReason,
    ) -> FolioResult<bool> {
        let _guard = self.locks.acquire(&Self::lock_key(collection, key)).await;
        self.evict_locked(collection, key, reason).await
    }

    async fn evict_locked(
        &self,
        collection: &str,
        key: &str,
        reason: EvictionReason,
    ) -> FolioResult<bool> {
        if reason != EvictionReason::Manual {
            if let Some(envelope) = self.read_envelope(collection, key).await? {
                if envelope.metadata.is_pinned {
                    if self.config.log_operations {
                        tracing::debug!(
                            collection,
                            key,
                            reason = reason.as_str(),
                            "eviction skipped, entry is pinned"
                        );
                    }
                    return Ok(false);
                }
            }
        }

        let deleted = self.store.delete(collection, key).await?;
        if deleted {
            self.metrics.record_eviction(reason);
            if self.config.log_operations {
                tracing::debug!(collection, key, reason = reason.as_str(), "evicted");
            }
        }
        Ok(deleted)
    }

    /// Evict every expired, non-pinned entry in `collection`.
    ///
    /// Returns the number evicted. Usually scheduled on the work queue via
    /// [`CacheOrchestrator::schedule_expired_sweep`].
    pub async fn sweep_expired(&self, collection: &str) -> FolioResult<u64> {
        let keys = self.store.keys(collection).await?;
        let mut evicted = 0u64;

        for key in keys {
            let _guard = self.locks.acquire(&Self::lock_key(collection, &key)).await;
            let Some(envelope) = self.read_envelope(collection, &key).await? else {
                continue;
            };
            if envelope.metadata.is_expired()
                && self
                    .evict_locked(collection, &key, EvictionReason::TtlExpired)
                    .await?
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(collection, evicted, "expired-entry sweep completed");
        }
        Ok(evicted)
    }

    /// Evict least-recently-accessed non-pinned entries until the
    /// collection's total payload size fits the configured budget.
    ///
    /// A no-op unless `max_collection_bytes` is set.
    pub async fn sweep_capacity(&self, collection: &str) -> FolioResult<u64> {
        let Some(budget) = self.config.max_collection_bytes else {
            return Ok(0);
        };

        let keys = self.store.keys(collection).await?;
        let mut candidates = Vec::new();
        let mut total: u64 = 0;
        for key in keys {
            let Some(envelope) = self.read_envelope(collection, &key).await? else {
                continue;
            };
            total += envelope.metadata.size_bytes;
            if !envelope.metadata.is_pinned {
                candidates.push((
                    key,
                    envelope.metadata.size_bytes,
                    envelope.metadata.last_access_at,
                ));
            }
        }

        if total <= budget {
            return Ok(0);
        }
        candidates.sort_by(|a, b| a.2.cmp(&b.2));

        let mut evicted = 0u64;
        for (key, size, _) in candidates {
            if total <= budget {
                break;
            }
            let _guard = self.locks.acquire(&Self::lock_key(collection, &key)).await;
            if self
                .evict_locked(collection, &key, EvictionReason::Capacity)
                .await?
            {
                total = total.saturating_sub(size);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(collection, evicted, total, budget, "capacity sweep completed");
        }
        Ok(evicted)
    }

    /// Single-flight refresh of one entry from the external source.
    ///
    /// Runs under the key lock with a double-check: when a concurrent
    /// refresher already brought the entry back to fresh, the fetch is
    /// skipped. On fetch failure the previously cached data (if any) is
    /// returned as `Stale` with the error attached; the cache itself is
    /// left untouched. A source that reports the item gone also leaves the
    /// cache untouched and returns `Missing` - removal is an explicit
    /// eviction decision, not a refresh side effect.
    pub async fn refresh<T>(
        &self,
        collection: &str,
        key: &str,
        fetcher: &dyn Fetcher<T>,
        patch: MetadataPatch,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let _guard = self.locks.acquire(&Self::lock_key(collection, key)).await;
        match self.refresh_locked(collection, key, fetcher, patch).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(collection, key, error = %e, "Refresh failed");
                CacheResult::error(e, None, None)
            }
        }
    }

    async fn refresh_locked<T>(
        &self,
        collection: &str,
        key: &str,
        fetcher: &dyn Fetcher<T>,
        patch: MetadataPatch,
    ) -> FolioResult<CacheResult<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let previous = self.read_envelope(collection, key).await?;

        // Double-check: a refresher that was queued behind another for the
        // same key finds the entry fresh again and skips the fetch.
        if let Some(envelope) = &previous {
            if !envelope.metadata.is_expired() {
                if let Ok(data) = serde_json::from_value::<T>(envelope.payload.clone()) {
                    return Ok(CacheResult::fresh(data, envelope.metadata.clone()));
                }
            }
        }

        match fetcher.fetch(key).await {
            Ok(Some(value)) => {
                let payload =
                    serde_json::to_value(&value).map_err(|e| StoreError::Serialization {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                let existing = previous.map(|envelope| envelope.metadata);
                let metadata = self
                    .write_entry_locked(
                        collection,
                        key,
                        payload,
                        patch,
                        DataSource::CacheRefresh,
                        existing,
                    )
                    .await?;
                Ok(CacheResult::fresh(value, metadata))
            }
            Ok(None) => Ok(CacheResult::missing(None)),
            Err(e) => match previous {
                Some(envelope) => {
                    let data = serde_json::from_value::<T>(envelope.payload).map_err(|err| {
                        StoreError::Serialization {
                            key: key.to_string(),
                            reason: err.to_string(),
                        }
                    })?;
                    Ok(CacheResult::stale(data, envelope.metadata, Some(e)))
                }
                None => Ok(CacheResult::error(e, None, None)),
            },
        }
    }

    /// Schedule a background refresh on the work queue.
    pub fn schedule_refresh<T, F>(
        &self,
        collection: &str,
        key: &str,
        fetcher: Arc<F>,
        patch: MetadataPatch,
    ) -> JobHandle<CacheResult<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fetcher<T> + 'static,
    {
        let this = self.clone();
        let collection = collection.to_string();
        let key = key.to_string();
        self.queue.add(async move {
            this.refresh::<T>(&collection, &key, fetcher.as_ref(), patch)
                .await
        })
    }

    /// Schedule an expired-entry sweep on the work queue.
    pub fn schedule_expired_sweep(&self, collection: &str) -> JobHandle<FolioResult<u64>> {
        let this = self.clone();
        let collection = collection.to_string();
        self.queue
            .add(async move { this.sweep_expired(&collection).await })
    }

    /// Schedule a journal drain on the work queue (fire-and-forget).
    pub fn schedule_journal_drain(&self) -> JobHandle<FolioResult<u64>> {
        let this = self.clone();
        self.queue.add(async move { this.drain_pending_pins().await })
    }

    /// Apply journaled pin operations in enqueue order.
    ///
    /// An operation applies by flipping the pin flag on the now-cached
    /// item; an item that is still uncached fails its entry, which stays
    /// journaled and stops the drain so order is preserved for the next
    /// attempt. Returns the number applied.
    pub async fn drain_pending_pins(&self) -> FolioResult<u64> {
        let this = self.clone();
        self.journal
            .drain(move |op| {
                let this = this.clone();
                async move { this.apply_pin_op(op).await }
            })
            .await
    }

    /// Apply one journaled pin operation against the data collections.
    ///
    /// Collections are searched in a fixed order so replay stays
    /// deterministic; the composite-key convention keeps keys from
    /// colliding across collections in practice.
    async fn apply_pin_op(&self, op: PendingPinOperation) -> FolioResult<()> {
        let pinned = op.operation == PinOperation::Pin;

        for collection in DATA_COLLECTIONS {
            let _guard = self
                .locks
                .acquire(&Self::lock_key(collection, &op.item_key))
                .await;
            if let Some(envelope) = self.read_envelope(collection, &op.item_key).await? {
                if envelope.metadata.is_pinned != pinned {
                    let metadata = envelope.metadata.with_pinned(pinned);
                    self.write_envelope_raw(collection, &op.item_key, &metadata, &envelope.payload)
                        .await?;
                }
                self.metrics.record_pin_op_applied();
                return Ok(());
            }
        }

        Err(FolioError::NotFound {
            collection: DATA_COLLECTIONS.join(","),
            key: op.item_key,
        })
    }

    /// Read an entry's envelope. Caller must hold the key lock.
    async fn read_envelope(
        &self,
        collection: &str,
        key: &str,
    ) -> FolioResult<Option<CacheEnvelope>> {
        let Some(bytes) = self.store.get(collection, key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<CacheEnvelope>(&bytes) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(_) => Ok(None),
        }
    }

    /// Read just an entry's metadata. Caller must hold the key lock.
    async fn read_metadata(
        &self,
        collection: &str,
        key: &str,
    ) -> FolioResult<Option<CacheMetadata>> {
        Ok(self
            .read_envelope(collection, key)
            .await?
            .map(|envelope| envelope.metadata))
    }

    /// Build the merged metadata and persist the envelope. Caller must
    /// hold the key lock.
    async fn write_entry_locked(
        &self,
        collection: &str,
        key: &str,
        payload: Value,
        patch: MetadataPatch,
        default_source: DataSource,
        existing: Option<CacheMetadata>,
    ) -> FolioResult<CacheMetadata> {
        let payload_len = serde_json::to_vec(&payload)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        let mut metadata = CacheMetadata::new(key, collection)
            .with_ttl(patch.ttl.unwrap_or(self.config.default_ttl))
            .with_source(patch.source.unwrap_or(default_source))
            .with_size_bytes(payload_len);
        if let Some(language) = patch.language {
            metadata = metadata.with_language(language);
        }
        if let Some(direction) = patch.direction {
            metadata = metadata.with_direction(direction);
        }
        if let Some(hash) = patch.content_hash {
            metadata = metadata.with_content_hash(hash);
        }
        if let Some(properties) = patch.properties {
            metadata = metadata.with_properties(properties);
        }

        // Re-caching must not silently unpin or zero the access history.
        // last_access_at resets to created_at to keep the invariant
        // last_access_at >= created_at.
        if let Some(previous) = existing {
            metadata.access_count = previous.access_count;
            metadata.is_pinned = patch.pinned.unwrap_or(previous.is_pinned);
        } else {
            metadata.is_pinned = patch.pinned.unwrap_or(false);
        }
        metadata.validate()?;

        self.write_envelope_raw(collection, key, &metadata, &payload)
            .await?;
        self.metrics.record_write();
        if self.config.log_operations {
            tracing::debug!(
                collection,
                key,
                size_bytes = metadata.size_bytes,
                pinned = metadata.is_pinned,
                "cache write"
            );
        }
        Ok(metadata)
    }

    /// Serialize and store an envelope. Caller must hold the key lock.
    async fn write_envelope_raw(
        &self,
        collection: &str,
        key: &str,
        metadata: &CacheMetadata,
        payload: &Value,
    ) -> FolioResult<()> {
        let envelope = CacheEnvelope {
            metadata: metadata.clone(),
            payload: payload.clone(),
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.put(collection, key, &bytes).await
    }
}
