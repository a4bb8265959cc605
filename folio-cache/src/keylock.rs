//! Per-key mutual exclusion.
//!
//! Concurrent callers operating on the same cache key collapse into a
//! single critical section; callers on different keys never block each
//! other. Waiters for one key acquire in FIFO order (tokio's mutex uses a
//! fair queue), giving each key a total order of operations.
//!
//! Release is RAII: dropping the guard releases the lock on every exit
//! path, including early returns, `?` propagation and panics, so a lock
//! can never leak.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

type SlotMap = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Registry of per-key async locks.
///
/// Idle slots are pruned when their last holder releases, so the registry
/// stays proportional to the number of keys currently contended, not the
/// number of keys ever seen.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: SlotMap,
}

impl KeyLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`.
    ///
    /// Returns immediately when no holder exists; otherwise suspends until
    /// the current holder releases and every earlier waiter has had its
    /// turn. The returned guard releases on drop.
    pub async fn acquire(&self, key: &str) -> KeyLockGuard {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let permit = slot.clone().lock_owned().await;
        KeyLockGuard {
            permit: Some(permit),
            slot: Some(slot),
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Run `body` while holding the lock for `key`.
    ///
    /// The lock is released on all exit paths; if `body` returns an error
    /// or panics, the error/panic propagates to the caller after release.
    pub async fn synchronized<F, Fut, T>(&self, key: &str, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        body().await
    }

    /// Number of keys currently tracked (held or contended). Diagnostics.
    pub fn slot_count(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

fn lock_slots(
    slots: &SlotMap,
) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    // The map is only touched in short non-async sections, so a poisoned
    // mutex still holds a structurally valid map; recover it.
    match slots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exclusive hold on one key. Dropping releases the lock.
#[derive(Debug)]
pub struct KeyLockGuard {
    permit: Option<OwnedMutexGuard<()>>,
    slot: Option<Arc<Mutex<()>>>,
    key: String,
    slots: SlotMap,
}

impl KeyLockGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        // Release the mutex (and its internal Arc) before counting holders.
        self.permit.take();
        let slot = self.slot.take();

        let mut slots = lock_slots(&self.slots);
        // Drop our own clone inside the critical section; any concurrent
        // acquire clones under the same map lock, so the count is stable.
        drop(slot);
        let idle = slots
            .get(&self.key)
            .map(|entry| Arc::strong_count(entry) == 1)
            .unwrap_or(false);
        if idle {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_never_overlaps() {
        let locks = Arc::new(KeyLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            handles.push(tokio::spawn(async move {
                locks
                    .synchronized("b1_v2", || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(30)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_keys_overlap() {
        let locks = Arc::new(KeyLocks::new());

        let spans = |key: &'static str| {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks
                    .synchronized(key, || async {
                        let start = Instant::now();
                        sleep(Duration::from_millis(80)).await;
                        (start, Instant::now())
                    })
                    .await
            })
        };

        let a = spans("book_a");
        let b = spans("book_b");
        let (a_start, a_end) = a.await.expect("task should not panic");
        let (b_start, b_end) = b.await.expect("task should not panic");

        // Intervals must overlap: each starts before the other ends.
        assert!(a_start < b_end && b_start < a_end);
    }

    #[tokio::test]
    async fn test_waiters_acquire_in_fifo_order() {
        let locks = Arc::new(KeyLocks::new());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let first = locks.acquire("k").await;

        let mut handles = Vec::new();
        for i in 0..3 {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("k").await;
                order.lock().expect("order lock").push(i);
            }));
            // Let each waiter enqueue before spawning the next.
            sleep(Duration::from_millis(10)).await;
        }

        drop(first);
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(*order.lock().expect("order lock"), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_error_propagates_after_release() {
        let locks = KeyLocks::new();

        let result: Result<(), &str> = locks
            .synchronized("k", || async { Err("body failed") })
            .await;
        assert_eq!(result, Err("body failed"));

        // The lock did not leak: a fresh acquire succeeds immediately.
        let guard = locks.acquire("k").await;
        assert_eq!(guard.key(), "k");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_does_not_leak_lock() {
        let locks = Arc::new(KeyLocks::new());

        let panicking = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks
                    .synchronized("k", || async {
                        panic!("body panicked");
                    })
                    .await
            })
        };
        assert!(panicking.await.is_err());

        let guard = locks.acquire("k").await;
        assert_eq!(guard.key(), "k");
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = KeyLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.slot_count(), 2);
        }
        assert_eq!(locks.slot_count(), 0);
    }
}
