//! Lifecycle controller
//!
//! Owns startup ordering (never run workers against un-synced caches),
//! graceful shutdown, and the composition of queue, dispatcher, and worker
//! pool. The controller is the only component allowed to initiate teardown.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Service};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::ObjectCache;
use crate::dispatch::Dispatcher;
use crate::queue::WorkQueue;
use crate::worker::WorkerPool;
use crate::{Error, Result};

/// Lifecycle phases of the controller.
///
/// Transitions are strictly forward; no phase is revisited. A run that fails
/// during cache sync skips `Running` and goes straight to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ControllerState {
    /// Constructed, not yet running
    Created,
    /// Waiting for the informer caches to complete their initial listing
    CachesSyncing,
    /// Worker pool active
    Running,
    /// Draining the queue and waiting for workers to exit
    ShuttingDown,
    /// All workers exited
    Stopped,
}

/// Orchestrates the reconciliation engine's lifecycle.
pub struct Controller {
    queue: WorkQueue<String>,
    dispatcher: Arc<Dispatcher>,
    services: Arc<ObjectCache<Service>>,
    endpoints: Arc<ObjectCache<Endpoints>>,
    state: Mutex<ControllerState>,
}

impl Controller {
    /// Compose a controller from its collaborators
    pub fn new(
        queue: WorkQueue<String>,
        dispatcher: Arc<Dispatcher>,
        services: Arc<ObjectCache<Service>>,
        endpoints: Arc<ObjectCache<Endpoints>>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            services,
            endpoints,
            state: Mutex::new(ControllerState::Created),
        }
    }

    /// Current lifecycle phase
    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    fn transition(&self, next: ControllerState) {
        let mut state = self.state.lock();
        debug_assert!(next > *state, "lifecycle transitions are strictly forward");
        info!(from = ?*state, to = ?next, "Controller state transition");
        *state = next;
    }

    /// Run the controller until the shutdown signal fires.
    ///
    /// Blocks through the full lifecycle: wait for cache sync, run `workers`
    /// concurrent worker loops, then drain and join them once `shutdown` is
    /// cancelled. The only error this returns is a cache-sync failure;
    /// everything else is contained within the reconciliation loop.
    pub async fn run(&self, workers: usize, shutdown: CancellationToken) -> Result<()> {
        self.transition(ControllerState::CachesSyncing);
        info!("Waiting for informer caches to sync");

        tokio::select! {
            _ = shutdown.cancelled() => {
                self.transition(ControllerState::Stopped);
                return Err(Error::cache_sync(
                    "shutdown requested before informer caches synced",
                ));
            }
            _ = async {
                self.services.wait_synced().await;
                self.endpoints.wait_synced().await;
            } => {}
        }

        self.transition(ControllerState::Running);
        info!(workers, "Starting workers");
        let pool = WorkerPool::start(workers, self.queue.clone(), Arc::clone(&self.dispatcher));

        shutdown.cancelled().await;

        self.transition(ControllerState::ShuttingDown);
        info!("Shutting down workers");
        self.queue.shut_down();
        // Unbounded on purpose: workers finish their current item and then
        // observe the drained queue. In-flight reconciliation is never
        // abandoned.
        pool.join().await;

        self.transition(ControllerState::Stopped);
        info!("Controller stopped");
        Ok(())
    }
}
