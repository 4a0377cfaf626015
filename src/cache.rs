//! Local object cache collaborator
//!
//! A read-only view of watched objects, populated by the informer driver and
//! consulted by the Sync Dispatcher at dispatch time. Lookups are
//! non-blocking and may be briefly stale relative to the API server; the
//! level-triggered engine tolerates that by re-reading on every pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

/// Namespaced identity of a cached object
pub type ObjectId = (String, String);

/// Concurrent cache of one watched kind.
///
/// Snapshots are handed out as `Arc<T>`: the engine borrows them for the
/// duration of one sync call and never mutates them.
pub struct ObjectCache<T> {
    objects: DashMap<ObjectId, Arc<T>>,
    synced: AtomicBool,
    sync_notify: Notify,
}

impl<T> Default for ObjectCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectCache<T> {
    /// Create an empty, not-yet-synced cache
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            synced: AtomicBool::new(false),
            sync_notify: Notify::new(),
        }
    }

    /// Look up an object by namespace and name
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<T>> {
        self.objects
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Store a snapshot, returning the previous one if the object was known
    pub fn insert(&self, namespace: impl Into<String>, name: impl Into<String>, obj: T) -> Option<Arc<T>> {
        self.objects
            .insert((namespace.into(), name.into()), Arc::new(obj))
    }

    /// Evict an object, returning the last snapshot if it was present
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Arc<T>> {
        self.objects
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(_, obj)| obj)
    }

    /// Evict every entry not named in `listed`, returning the eviction count.
    ///
    /// A relist is a full snapshot replacement: objects deleted while the
    /// watch was disconnected are never replayed, so anything the new
    /// listing did not mention no longer exists on the API server.
    pub fn evict_unlisted(&self, listed: &HashSet<ObjectId>) -> usize {
        let before = self.objects.len();
        self.objects.retain(|id, _| listed.contains(id));
        before - self.objects.len()
    }

    /// Number of cached objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the cache holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Mark the initial listing as complete and wake sync waiters.
    ///
    /// Called by the informer driver once the watch has replayed the full
    /// initial state. Idempotent; the flag never goes back to false.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
        self.sync_notify.notify_waiters();
    }

    /// True once the initial listing has completed
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Wait until the cache reports its initial sync complete.
    ///
    /// The Lifecycle Controller races this against the shutdown signal; the
    /// cache itself never times out.
    pub async fn wait_synced(&self) {
        loop {
            let notified = self.sync_notify.notified();
            if self.has_synced() {
                return;
            }
            notified.await;
        }
    }
}
