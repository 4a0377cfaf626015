//! Worker pool
//!
//! A fixed set of symmetric worker loops pulling keys from the work queue
//! and driving the dispatcher. The queue itself is the only synchronization
//! point: there is no work-stealing or affinity, and workers hold no state
//! between items.
//!
//! The queue's `done` release runs through a drop guard, so the queue's
//! in-flight accounting survives every exit path from a processing pass,
//! including a panicking handler. A panicking worker kills only its own task.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, SyncOutcome};
use crate::queue::WorkQueue;

/// Releases queue ownership of a key on every exit path.
struct DoneGuard<'a> {
    queue: &'a WorkQueue<String>,
    key: &'a String,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

/// Handles to a running set of worker loops.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` worker loops against the given queue and dispatcher.
    ///
    /// Each loop runs until the queue reports shutdown.
    pub fn start(count: usize, queue: WorkQueue<String>, dispatcher: Arc<Dispatcher>) -> Self {
        let handles = (0..count)
            .map(|worker| {
                let queue = queue.clone();
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    debug!(worker, "Worker started");
                    while process_next(&queue, &dispatcher).await {}
                    debug!(worker, "Worker stopped");
                })
            })
            .collect();
        Self { handles }
    }

    /// Number of worker loops in the pool
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if the pool was started with zero workers
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker loop to observe shutdown and exit.
    ///
    /// Deliberately unbounded: workers finish their current item and then see
    /// the drained queue, so in-flight reconciliation is never abandoned.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    warn!("Worker task panicked");
                }
            }
        }
    }
}

/// Process a single work item.
///
/// Returns `false` once the queue reports shutdown, `true` otherwise,
/// including after a failed sync, which is re-queued with backoff rather
/// than surfaced.
pub async fn process_next(queue: &WorkQueue<String>, dispatcher: &Dispatcher) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    // Ownership of the key is released when the guard drops, even if the
    // handler panics mid-sync.
    let _done = DoneGuard { queue, key: &key };

    match dispatcher.sync(&key).await {
        SyncOutcome::Synced => {
            queue.forget(&key);
            info!(key = %key, "Successfully synced");
        }
        SyncOutcome::Gone | SyncOutcome::SkippedUnknownKind | SyncOutcome::InvalidKey => {
            // Terminal outcomes: clear backoff state so the key cannot
            // accumulate retry history it will never use.
            queue.forget(&key);
        }
        SyncOutcome::Failed(_) => {
            // Not forgotten: the failure count keeps growing so the backoff
            // escalates until the key finally syncs.
            queue.add_rate_limited(key.clone());
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    use crate::cache::ObjectCache;
    use crate::dispatch::SyncHandler;
    use crate::error::Error;
    use crate::sink::TracingSink;
    use crate::Result;

    struct ScriptedHandler {
        calls: AtomicUsize,
        failures: usize,
        panic_once: bool,
    }

    impl ScriptedHandler {
        fn failing_times(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                panic_once: false,
            })
        }

        fn panicking_once() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures: 0,
                panic_once: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncHandler<Service> for ScriptedHandler {
        async fn sync(&self, _namespace: &str, _name: &str, _obj: Arc<Service>) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_once && call == 0 {
                panic!("handler blew up");
            }
            if call < self.failures {
                Err(Error::sync("transient failure"))
            } else {
                Ok(())
            }
        }
    }

    fn service(namespace: &str, name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                resource_version: Some("1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fixture(handler: Arc<ScriptedHandler>) -> (WorkQueue<String>, Arc<Dispatcher>) {
        let services: Arc<ObjectCache<Service>> = Arc::new(ObjectCache::new());
        services.insert("default", "web", service("default", "web"));
        let dispatcher = Arc::new(
            Dispatcher::new(services, Arc::new(ObjectCache::new()), Arc::new(TracingSink))
                .with_service_handler(handler),
        );
        let queue = WorkQueue::new(Duration::from_millis(1), Duration::from_secs(1));
        (queue, dispatcher)
    }

    #[tokio::test]
    async fn successful_sync_forgets_the_key() {
        let handler = ScriptedHandler::failing_times(0);
        let (queue, dispatcher) = fixture(handler.clone());
        let key = "Service/default/web".to_string();

        queue.add(key.clone());
        assert!(process_next(&queue, &dispatcher).await);

        assert_eq!(handler.calls(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.requeues(&key), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sync_is_requeued_with_growing_backoff() {
        let handler = ScriptedHandler::failing_times(2);
        let (queue, dispatcher) = fixture(handler.clone());
        let key = "Service/default/web".to_string();

        queue.add(key.clone());

        // Two failing passes, then a success.
        assert!(process_next(&queue, &dispatcher).await);
        assert_eq!(queue.requeues(&key), 1);
        assert!(process_next(&queue, &dispatcher).await);
        assert_eq!(queue.requeues(&key), 2);
        assert!(process_next(&queue, &dispatcher).await);

        assert_eq!(handler.calls(), 3);
        assert_eq!(queue.requeues(&key), 0, "success clears backoff state");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let handler = ScriptedHandler::failing_times(0);
        let (queue, dispatcher) = fixture(handler);
        queue.shut_down();
        assert!(!process_next(&queue, &dispatcher).await);
    }

    /// A panicking handler must neither leak the queue's in-flight
    /// accounting nor take down the other workers.
    #[tokio::test]
    async fn panicking_handler_releases_the_key_and_spares_the_pool() {
        let handler = ScriptedHandler::panicking_once();
        let (queue, dispatcher) = fixture(handler.clone());
        let key = "Service/default/web".to_string();

        queue.add(key.clone());

        let pool = WorkerPool::start(2, queue.clone(), dispatcher);
        assert_eq!(pool.len(), 2);

        // The first pass panics; the drop guard releases the key, so a
        // re-add must be processable by the surviving worker.
        while handler.calls() == 0 {
            tokio::task::yield_now().await;
        }
        queue.add(key.clone());
        while handler.calls() < 2 {
            tokio::task::yield_now().await;
        }

        queue.shut_down();
        pool.join().await;
        assert_eq!(handler.calls(), 2);
    }
}
