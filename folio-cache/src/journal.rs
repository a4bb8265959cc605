//! Durable queue of pending pin/unpin intents.
//!
//! Pin requests made while an item is not cached (or while offline) are
//! journaled in the `pending_pin_ops` collection and replayed later.
//! Entries persist across restarts and are removed only after they have
//! been applied, giving at-least-once semantics - `apply` must therefore
//! be idempotent (pinning an already-pinned item is a no-op success).
//!
//! Ordering is the correctness source of truth: a `Pin` followed by an
//! `Unpin` of the same key must land in that order so the final state
//! matches user intent. Entries are keyed by UUIDv7, whose string form
//! sorts by creation time, so storage order is enqueue order; entries are
//! never coalesced by key and never edited in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_core::keys::PENDING_PIN_OPS;
use folio_core::{FolioResult, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::KeyValueStore;

/// The pin intent of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinOperation {
    Pin,
    Unpin,
}

/// One journaled pin/unpin intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPinOperation {
    /// Unique entry id (UUIDv7, time-sortable).
    pub id: Uuid,
    /// Whether to pin or unpin the item.
    pub operation: PinOperation,
    /// Logical cache key of the target item.
    pub item_key: String,
    /// When the user made the request.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,
}

impl PendingPinOperation {
    /// A new pin intent for `item_key`.
    pub fn pin(item_key: impl Into<String>) -> Self {
        Self::new(PinOperation::Pin, item_key)
    }

    /// A new unpin intent for `item_key`.
    pub fn unpin(item_key: impl Into<String>) -> Self {
        Self::new(PinOperation::Unpin, item_key)
    }

    fn new(operation: PinOperation, item_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation,
            item_key: item_key.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// How long the entry has been waiting.
    pub fn age(&self) -> Duration {
        let now = Utc::now();
        if now > self.enqueued_at {
            (now - self.enqueued_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}

/// Append-only durable queue of [`PendingPinOperation`] records.
pub struct PinOperationJournal<S: KeyValueStore> {
    store: Arc<S>,
    collection: String,
}

impl<S: KeyValueStore> PinOperationJournal<S> {
    /// Create a journal over the standard `pending_pin_ops` collection.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_collection(store, PENDING_PIN_OPS)
    }

    /// Create a journal over a custom collection.
    pub fn with_collection(store: Arc<S>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Append an intent to the journal.
    pub async fn enqueue(&self, op: &PendingPinOperation) -> FolioResult<()> {
        let bytes = serde_json::to_vec(op).map_err(|e| StoreError::Serialization {
            key: op.id.to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .put(&self.collection, &op.id.to_string(), &bytes)
            .await
    }

    /// All pending entries in enqueue order.
    ///
    /// Entries that no longer deserialize are dropped from the journal
    /// (logged, never fatal) so one corrupt record cannot wedge the drain.
    pub async fn pending(&self) -> FolioResult<Vec<PendingPinOperation>> {
        let keys = self.store.keys(&self.collection).await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(bytes) = self.store.get(&self.collection, &key).await? else {
                continue;
            };
            match serde_json::from_slice::<PendingPinOperation>(&bytes) {
                Ok(op) => entries.push(op),
                Err(e) => {
                    tracing::warn!(
                        entry = %key,
                        error = %e,
                        "Dropping corrupt pin journal entry"
                    );
                    self.store.delete(&self.collection, &key).await?;
                }
            }
        }

        // Entries from older installs may predate UUIDv7 ids, so order on
        // the enqueue timestamp first and the id only as a tiebreaker.
        entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Number of pending entries.
    pub async fn len(&self) -> FolioResult<usize> {
        Ok(self.store.keys(&self.collection).await?.len())
    }

    /// Whether the journal has no pending entries.
    pub async fn is_empty(&self) -> FolioResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Apply pending entries in enqueue order.
    ///
    /// Each entry is removed only after `apply` succeeds. On the first
    /// failure the entry is left in place and draining stops, preserving
    /// order for the next attempt; the failure itself is not propagated
    /// (the next drain retries). Returns the number of entries applied.
    pub async fn drain<F, Fut>(&self, mut apply: F) -> FolioResult<u64>
    where
        F: FnMut(PendingPinOperation) -> Fut,
        Fut: std::future::Future<Output = FolioResult<()>>,
    {
        let mut applied = 0u64;

        for op in self.pending().await? {
            let entry_id = op.id;
            match apply(op.clone()).await {
                Ok(()) => {
                    self.store
                        .delete(&self.collection, &entry_id.to_string())
                        .await?;
                    applied += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        entry = %entry_id,
                        item_key = %op.item_key,
                        age_ms = op.age().as_millis() as u64,
                        error = %e,
                        "Pin journal apply failed, will retry on next drain"
                    );
                    break;
                }
            }
        }

        Ok(applied)
    }
}
