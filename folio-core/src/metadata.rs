//! Per-entry cache metadata.
//!
//! `CacheMetadata` is a pure value type: derived queries take or capture a
//! wall-clock instant and never touch I/O. All mutation happens by
//! constructing a new snapshot (`with_incremented_access`, the `with_*`
//! builders); the orchestrator owns the lifecycle and callers only ever see
//! immutable copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::DEFAULT_TTL;

/// Where a cached payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    /// Fetched from the remote source.
    #[default]
    Network,
    /// Served from the local cache.
    Cache,
    /// Re-fetched in the background to revalidate a cached entry.
    CacheRefresh,
}

/// Descriptor stored alongside every cached payload.
///
/// Serializes to the flat map the reading client persists
/// (`originalKey`, `boxName`, `timestamp`, `ttlMillis`, ...); unknown
/// fields in stored records are ignored on read so older and newer
/// clients can share a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Logical cache key (not the storage-engine key).
    pub original_key: String,

    /// Logical namespace the entry lives in.
    #[serde(rename = "boxName")]
    pub collection: String,

    /// When the entry was written.
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Time-to-live from `created_at`.
    #[serde(rename = "ttlMillis", with = "duration_millis")]
    pub ttl: Duration,

    /// Serialized payload size, informational (eviction heuristics).
    #[serde(rename = "dataSizeBytes", default)]
    pub size_bytes: u64,

    /// Content language tag, e.g. "ar", "en".
    #[serde(default)]
    pub language: Option<String>,

    /// Text direction tag, e.g. "rtl", "ltr".
    #[serde(default)]
    pub direction: Option<String>,

    /// Provenance of the payload.
    #[serde(default)]
    pub source: DataSource,

    /// Content hash for change detection, as provided by the producer.
    #[serde(rename = "hash", default)]
    pub content_hash: Option<String>,

    /// Successful fresh reads of this entry.
    #[serde(default)]
    pub access_count: u64,

    /// Instant of the most recent successful fresh read.
    #[serde(rename = "lastAccessTimestamp", with = "chrono::serde::ts_milliseconds")]
    pub last_access_at: DateTime<Utc>,

    /// Opaque extension map, passed through verbatim.
    #[serde(default)]
    pub properties: Map<String, Value>,

    /// Pinned entries never expire and survive policy-driven eviction.
    #[serde(default)]
    pub is_pinned: bool,
}

/// Serialize a `std::time::Duration` as whole milliseconds (`ttlMillis`).
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl CacheMetadata {
    /// Create metadata for a new entry with the default TTL.
    ///
    /// `created_at` and `last_access_at` are both set to now; the entry
    /// starts unpinned with an access count of zero.
    pub fn new(original_key: impl Into<String>, collection: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            original_key: original_key.into(),
            collection: collection.into(),
            created_at: now,
            ttl: DEFAULT_TTL,
            size_bytes: 0,
            language: None,
            direction: None,
            source: DataSource::Network,
            content_hash: None,
            access_count: 0,
            last_access_at: now,
            properties: Map::new(),
            is_pinned: false,
        }
    }

    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the creation instant (also clamps `last_access_at` forward so
    /// the `last_access_at >= created_at` invariant holds).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        if self.last_access_at < created_at {
            self.last_access_at = created_at;
        }
        self
    }

    /// Set the serialized payload size.
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the content language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the text direction tag.
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    /// Set the payload provenance.
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set or clear the pin flag.
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.is_pinned = pinned;
        self
    }

    /// Insert a single extension property.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Replace the extension property map.
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Snapshot with `access_count + 1` and `last_access_at` set to `now`.
    ///
    /// Every other field is carried over unchanged; the receiver is not
    /// mutated.
    pub fn with_incremented_access_at(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.access_count += 1;
        next.last_access_at = now;
        next
    }

    /// Snapshot with the access stats bumped as of the current instant.
    pub fn with_incremented_access(&self) -> Self {
        self.with_incremented_access_at(Utc::now())
    }

    /// Check the metadata invariants.
    ///
    /// A zero TTL is only meaningful on a pinned entry (which never
    /// expires anyway); anywhere else it would make the entry dead on
    /// arrival.
    pub fn validate(&self) -> crate::error::FolioResult<()> {
        if self.ttl.is_zero() && !self.is_pinned {
            return Err(crate::error::ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: format!("{:?}", self.ttl),
                reason: "ttl must be positive for unpinned entries".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Instant at which the TTL elapses, or `None` when it is too far out
    /// to represent (such an entry never expires by age).
    fn expiry_deadline(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Whether the entry is past its TTL at `now`. Pinned entries never
    /// expire, regardless of age.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_pinned {
            return false;
        }
        match self.expiry_deadline() {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Whether the entry is past its TTL as of the current instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left until hard expiry at `now`, clamped at zero.
    ///
    /// Reports the raw arithmetic value even for pinned entries; pinning
    /// affects `is_expired`, not the TTL accounting itself.
    pub fn remaining_ttl_at(&self, now: DateTime<Utc>) -> Duration {
        let Some(deadline) = self.expiry_deadline() else {
            return self.ttl;
        };
        if now >= deadline {
            Duration::ZERO
        } else {
            (deadline - now).to_std().unwrap_or(Duration::ZERO)
        }
    }

    /// Time left until hard expiry as of the current instant.
    pub fn remaining_ttl(&self) -> Duration {
        self.remaining_ttl_at(Utc::now())
    }

    /// Whether the entry is older than `custom_ttl` at `now`.
    ///
    /// Unlike `is_expired` this ignores the pin flag: it is a soft
    /// staleness check used by background-refresh heuristics, so
    /// pinned-but-old content can still be revalidated without unpinning.
    pub fn is_stale_at(&self, custom_ttl: Duration, now: DateTime<Utc>) -> bool {
        let deadline = chrono::Duration::from_std(custom_ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        match deadline {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Whether the entry is older than `custom_ttl` as of now.
    pub fn is_stale(&self, custom_ttl: Duration) -> bool {
        self.is_stale_at(custom_ttl, Utc::now())
    }

    /// Age of the entry at `now`, clamped at zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        if now > self.created_at {
            (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Age of the entry as of the current instant.
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }
}
