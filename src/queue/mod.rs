//! Rate-limited, deduplicating work queue
//!
//! The queue is the single synchronization point of the reconciliation
//! engine. It guarantees:
//!
//! - **At most one worker per key**: a key handed to a worker by
//!   [`WorkQueue::get`] is not handed out again until that worker calls
//!   [`WorkQueue::done`].
//! - **No lost updates**: a key re-added while it is being processed is
//!   marked dirty and re-queued exactly once when the active pass finishes.
//! - **Dedup**: adding a key that is already pending is a no-op.
//!
//! `get` is the only suspending operation; `add`, `add_rate_limited`, `done`,
//! `forget`, and `shut_down` are non-blocking and safe to call from any task,
//! including from within a sync handler.

mod rate_limit;

pub use rate_limit::ItemBackoff;

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF};

struct QueueState<K> {
    queued: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

struct Shared<K> {
    state: Mutex<QueueState<K>>,
    wakeup: Notify,
    backoff: ItemBackoff<K>,
}

/// Rate-limited work queue of reconciliation keys.
///
/// This is a cheap cloneable handle; clones share the same queue. Keys are
/// opaque to the queue; dedup and ownership tracking use only `Eq`/`Hash`.
pub struct WorkQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    /// Create a queue whose retry backoff starts at `base_backoff` and doubles
    /// per consecutive failure up to `max_backoff`
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    queued: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                wakeup: Notify::new(),
                backoff: ItemBackoff::new(base_backoff, max_backoff),
            }),
        }
    }

    /// Add a key for processing.
    ///
    /// No-op if the key is already pending. If the key is currently being
    /// processed it is marked dirty instead and re-queued when the active
    /// pass calls [`done`](Self::done). Adds after [`shut_down`](Self::shut_down)
    /// are dropped.
    pub fn add(&self, key: K) {
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            trace!(?key, "Dropping add on draining queue");
            return;
        }
        if state.dirty.contains(&key) {
            // Already pending (queued or awaiting re-queue after Done).
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(?key, "Key in flight, deferring re-add");
            return;
        }
        state.queued.push_back(key);
        drop(state);
        self.shared.wakeup.notify_waiters();
    }

    /// Add a key after the backoff delay computed from its failure history.
    ///
    /// The delay grows exponentially per consecutive failure for the key and
    /// is reset by [`forget`](Self::forget). The insertion happens on a
    /// spawned timer task, so this must be called from within a tokio runtime.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.shared.backoff.next_delay(&key);
        trace!(?key, delay_ms = delay.as_millis() as u64, "Scheduling rate-limited add");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key.
    ///
    /// Suspends the caller until a key is available or the queue is shut down
    /// and drained. Returns `None` once shut down and empty; a returned key
    /// is owned by the caller until it calls [`done`](Self::done).
    pub async fn get(&self) -> Option<K> {
        loop {
            // Register for wakeups before checking, so a notify between the
            // check and the await cannot be missed.
            let notified = self.shared.wakeup.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(key) = state.queued.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release ownership of a key obtained from [`get`](Self::get).
    ///
    /// Must be called exactly once per `get`. If the key was re-added while
    /// in flight it goes back to the queue now.
    pub fn done(&self, key: &K) {
        let mut state = self.shared.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queued.push_back(key.clone());
            drop(state);
            self.shared.wakeup.notify_waiters();
        }
    }

    /// Clear the key's backoff state.
    ///
    /// Called on success, and on permanently invalid keys so they cannot
    /// accumulate retry state.
    pub fn forget(&self, key: &K) {
        self.shared.backoff.forget(key);
    }

    /// Number of consecutive failures recorded against the key
    pub fn requeues(&self, key: &K) -> u32 {
        self.shared.backoff.retries(key)
    }

    /// Number of keys waiting to be handed to a worker
    pub fn len(&self) -> usize {
        self.shared.state.lock().queued.len()
    }

    /// True if no keys are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip the queue into draining mode.
    ///
    /// Pending keys are still handed out, but new adds are dropped and every
    /// blocked or future [`get`](Self::get) returns `None` once the queue is
    /// empty. Idempotent.
    pub fn shut_down(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
        }
        debug!("Work queue shutting down");
        self.shared.wakeup.notify_waiters();
    }

    /// True once [`shut_down`](Self::shut_down) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet as StdHashSet;
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(Duration::from_millis(1), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn adds_are_deduplicated_while_pending() {
        let q = queue();
        q.add("Service/default/web".to_string());
        q.add("Service/default/web".to_string());
        q.add("Service/default/web".to_string());
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn get_hands_out_keys_in_fifo_order() {
        let q = queue();
        q.add("Service/default/a".to_string());
        q.add("Service/default/b".to_string());
        assert_eq!(q.get().await.unwrap(), "Service/default/a");
        assert_eq!(q.get().await.unwrap(), "Service/default/b");
    }

    /// A key re-added while a worker owns it must not be handed to a second
    /// worker; it re-appears exactly once after the owner calls done.
    #[tokio::test]
    async fn readd_during_processing_defers_until_done() {
        let q = queue();
        let key = "Endpoints/default/web".to_string();

        q.add(key.clone());
        let owned = q.get().await.unwrap();
        assert_eq!(owned, key);

        // Re-added (twice) while in flight: nothing becomes available.
        q.add(key.clone());
        q.add(key.clone());
        assert_eq!(q.len(), 0);

        q.done(&key);
        assert_eq!(q.len(), 1, "dirty key re-queued exactly once");
        assert_eq!(q.get().await.unwrap(), key);
        q.done(&key);
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn done_without_dirty_does_not_requeue() {
        let q = queue();
        q.add("Service/default/web".to_string());
        let key = q.get().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn shutdown_drains_then_releases_blocked_getters() {
        let q = queue();
        q.add("Service/default/web".to_string());

        // A getter blocked on an empty queue must observe the shutdown.
        let blocked = {
            let q = q.clone();
            tokio::spawn(async move {
                // First get drains the remaining item, second observes shutdown.
                let first = q.get().await;
                if let Some(ref key) = first {
                    q.done(key);
                }
                let second = q.get().await;
                (first, second)
            })
        };

        tokio::task::yield_now().await;
        q.shut_down();
        q.shut_down(); // idempotent

        let (first, second) = blocked.await.unwrap();
        assert_eq!(first.unwrap(), "Service/default/web");
        assert!(second.is_none());
        assert!(q.get().await.is_none(), "future gets also observe shutdown");
    }

    #[tokio::test]
    async fn adds_after_shutdown_are_dropped() {
        let q = queue();
        q.shut_down();
        q.add("Service/default/web".to_string());
        assert!(q.is_empty());
        assert!(q.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_add_lands_after_the_backoff_delay() {
        let q = queue();
        let key = "Service/default/web".to_string();

        q.add_rate_limited(key.clone());
        assert_eq!(q.requeues(&key), 1);

        // Paused clock auto-advances through the 1ms timer once we await.
        let got = q.get().await.unwrap();
        assert_eq!(got, key);
        q.done(&key);

        q.forget(&key);
        assert_eq!(q.requeues(&key), 0);
    }

    /// Core correctness contract: at most one worker holds a given key in
    /// `processing` at any instant, even with many workers racing adds and
    /// gets of overlapping keys.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_key_is_processed_by_two_workers_concurrently() {
        let q = queue();
        let in_flight: StdArc<Mutex<StdHashSet<String>>> =
            StdArc::new(Mutex::new(StdHashSet::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let q = q.clone();
                let in_flight = StdArc::clone(&in_flight);
                tokio::spawn(async move {
                    while let Some(key) = q.get().await {
                        assert!(
                            in_flight.lock().insert(key.clone()),
                            "key {key} handed to two workers at once"
                        );
                        tokio::task::yield_now().await;
                        in_flight.lock().remove(&key);
                        q.done(&key);
                    }
                })
            })
            .collect();

        // Hammer the queue with overlapping keys from several producers.
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move {
                    for round in 0..200 {
                        for name in ["a", "b", "c", "d", "e"] {
                            q.add(format!("Service/default/{name}"));
                        }
                        if round % 16 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        for p in producers {
            p.await.unwrap();
        }
        // Let workers drain, then shut down.
        while !q.is_empty() {
            tokio::task::yield_now().await;
        }
        q.shut_down();
        for w in workers {
            w.await.unwrap();
        }
    }
}
