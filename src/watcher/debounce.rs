//! Keyed debounce timers.
//!
//! Each key has at most one live timer. Scheduling a key that already has
//! one aborts it and starts over, so the action runs once, `delay` after the
//! last call. A fired action counts as in flight until it finishes.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Decrements the in-flight count when the action ends or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-key timers running on the tokio runtime.
pub struct Debouncer<K> {
    timers: Arc<Mutex<HashMap<K, Timer>>>,
    generation: AtomicU64,
    running: Arc<AtomicUsize>,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create a debouncer with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless `key` is scheduled or cancelled again
    /// first. Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let running = Arc::clone(&self.running);
        let task_key = key.clone();

        // Hold the lock across spawn so the task cannot look itself up
        // before it has been inserted.
        let mut map = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _in_flight = {
                let mut map = timers.lock();
                match map.get(&task_key) {
                    Some(timer) if timer.generation == generation => {
                        map.remove(&task_key);
                        // Counted under the lock so the key is never in neither place.
                        running.fetch_add(1, Ordering::AcqRel);
                        InFlight(running)
                    }
                    _ => return,
                }
            };
            action().await;
        });

        if let Some(previous) = map.insert(key, Timer { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        self.timers.lock().remove(key).map_or(false, |timer| {
            timer.handle.abort();
            true
        })
    }

    /// Cancel every timer whose key matches `predicate`.
    pub fn cancel_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut map = self.timers.lock();
        let doomed: Vec<K> = map.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            if let Some(timer) = map.remove(key) {
                timer.handle.abort();
            }
        }
        doomed.len()
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) -> usize {
        let mut map = self.timers.lock();
        let count = map.len();
        for (_, timer) in map.drain() {
            timer.handle.abort();
        }
        count
    }

    /// Whether `key` has a live timer.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.lock().contains_key(key)
    }

    /// Number of live timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }

    /// Number of fired actions that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// True when no timer is live and no action is running.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        let map = self.timers.lock();
        map.is_empty() && self.running.load(Ordering::Acquire) == 0
    }
}
