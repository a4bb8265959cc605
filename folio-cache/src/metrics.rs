//! Cache telemetry.
//!
//! Counters are plain atomics so every cache path can record events
//! without locking; `snapshot()` produces an immutable view for logging
//! or for an app-side diagnostics screen.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why an entry was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The entry's TTL elapsed and a sweep removed it.
    TtlExpired,
    /// An explicit caller-requested removal.
    Manual,
    /// A capacity sweep reclaimed space.
    Capacity,
}

impl EvictionReason {
    /// Stable label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::TtlExpired => "ttl_expired",
            EvictionReason::Manual => "manual",
            EvictionReason::Capacity => "capacity",
        }
    }
}

/// Counters for cache activity.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Fresh reads served from cache.
    pub hits: AtomicU64,
    /// Reads that found nothing usable.
    pub misses: AtomicU64,
    /// Reads that found expired-but-present data.
    pub stale_hits: AtomicU64,
    /// Entries written.
    pub writes: AtomicU64,
    /// Evictions because the TTL elapsed.
    pub evictions_ttl: AtomicU64,
    /// Explicit evictions.
    pub evictions_manual: AtomicU64,
    /// Capacity-sweep evictions.
    pub evictions_capacity: AtomicU64,
    /// Pin operations queued in the journal.
    pub pin_ops_enqueued: AtomicU64,
    /// Pin operations successfully applied from the journal.
    pub pin_ops_applied: AtomicU64,
}

impl MetricsCollector {
    /// Create a zeroed collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh cache hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stale hit.
    pub fn record_stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write.
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction with its reason.
    pub fn record_eviction(&self, reason: EvictionReason) {
        let counter = match reason {
            EvictionReason::TtlExpired => &self.evictions_ttl,
            EvictionReason::Manual => &self.evictions_manual,
            EvictionReason::Capacity => &self.evictions_capacity,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pin operation queued in the journal.
    pub fn record_pin_op_enqueued(&self) {
        self.pin_ops_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pin operation applied from the journal.
    pub fn record_pin_op_applied(&self) {
        self.pin_ops_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a current snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions_ttl: self.evictions_ttl.load(Ordering::Relaxed),
            evictions_manual: self.evictions_manual.load(Ordering::Relaxed),
            evictions_capacity: self.evictions_capacity.load(Ordering::Relaxed),
            pin_ops_enqueued: self.pin_ops_enqueued.load(Ordering::Relaxed),
            pin_ops_applied: self.pin_ops_applied.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub writes: u64,
    pub evictions_ttl: u64,
    pub evictions_manual: u64,
    pub evictions_capacity: u64,
    pub pin_ops_enqueued: u64,
    pub pin_ops_applied: u64,
}

impl MetricsSnapshot {
    /// Total evictions across all reasons.
    pub fn evictions(&self) -> u64 {
        self.evictions_ttl + self.evictions_manual + self.evictions_capacity
    }

    /// Fresh-hit rate over all classified reads (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.stale_hits;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_stale_hit();
        metrics.record_write();
        metrics.record_eviction(EvictionReason::TtlExpired);
        metrics.record_eviction(EvictionReason::Manual);
        metrics.record_eviction(EvictionReason::Capacity);
        metrics.record_pin_op_enqueued();
        metrics.record_pin_op_applied();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.stale_hits, 1);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.evictions(), 3);
        assert_eq!(snapshot.pin_ops_enqueued, 1);
        assert_eq!(snapshot.pin_ops_applied, 1);
    }

    #[test]
    fn test_hit_rate() {
        let metrics = MetricsCollector::new();
        for _ in 0..8 {
            metrics.record_hit();
        }
        metrics.record_miss();
        metrics.record_stale_hit();

        let snapshot = metrics.snapshot();
        assert!((snapshot.hit_rate() - 0.8).abs() < 0.001);

        let empty = MetricsSnapshot::default();
        assert!((empty.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_eviction_reason_labels() {
        assert_eq!(EvictionReason::TtlExpired.as_str(), "ttl_expired");
        assert_eq!(EvictionReason::Manual.as_str(), "manual");
        assert_eq!(EvictionReason::Capacity.as_str(), "capacity");
    }
}
