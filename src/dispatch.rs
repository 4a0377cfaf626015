//! Sync dispatch
//!
//! Routes a work key to the kind-specific reconciliation handler and
//! classifies the result. The dispatcher owns the outcome taxonomy; the
//! worker pool maps outcomes onto queue policy (forget vs. re-add with
//! backoff vs. drop).

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::cache::ObjectCache;
use crate::error::Error;
use crate::key::{ResourceKind, WorkKey};
use crate::sink::EventSink;
use crate::Result;

/// Event reason recorded when a resource syncs successfully
pub const REASON_SYNCED: &str = "Synced";
/// Event message recorded when a resource syncs successfully
pub const MESSAGE_SYNCED: &str = "Resource synced successfully";

/// Classification of one dispatch attempt.
///
/// Outcomes are mutually exclusive per attempt. `Synced`, `Gone`,
/// `SkippedUnknownKind`, and `InvalidKey` are terminal (the key is
/// forgotten); `Failed` sends the key back through the rate limiter.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Handler reconciled the object successfully
    Synced,
    /// Object was deleted between enqueue and dispatch; expected, not an error
    Gone,
    /// Key carries a kind this build does not recognize; skipped silently
    SkippedUnknownKind,
    /// Key does not parse; dropped permanently, never retried
    InvalidKey,
    /// Handler reported a transient failure; retry with backoff
    Failed(Error),
}

/// Kind-specific reconciliation handler.
///
/// Handlers must be idempotent: the engine may invoke them any number of
/// times for the same object. The snapshot is read-only; handlers that
/// mutate cluster state do so through their own client, never through the
/// cache.
#[async_trait]
pub trait SyncHandler<T>: Send + Sync {
    /// Reconcile one observed object
    async fn sync(&self, namespace: &str, name: &str, obj: Arc<T>) -> Result<()>;
}

/// Default read-only handler: logs the observed object as pretty JSON.
pub struct LogHandler;

#[async_trait]
impl<T> SyncHandler<T> for LogHandler
where
    T: Serialize + Send + Sync + 'static,
{
    async fn sync(&self, namespace: &str, name: &str, obj: Arc<T>) -> Result<()> {
        info!(
            namespace,
            name,
            object = %pretty_json(obj.as_ref()),
            "Handling resource"
        );
        Ok(())
    }
}

fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

/// Routes keys to handlers through the per-kind caches.
pub struct Dispatcher {
    services: Arc<ObjectCache<Service>>,
    endpoints: Arc<ObjectCache<Endpoints>>,
    service_handler: Arc<dyn SyncHandler<Service>>,
    endpoints_handler: Arc<dyn SyncHandler<Endpoints>>,
    sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Create a dispatcher with the default logging handlers
    pub fn new(
        services: Arc<ObjectCache<Service>>,
        endpoints: Arc<ObjectCache<Endpoints>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            services,
            endpoints,
            service_handler: Arc::new(LogHandler),
            endpoints_handler: Arc::new(LogHandler),
            sink,
        }
    }

    /// Replace the Service handler
    pub fn with_service_handler(mut self, handler: Arc<dyn SyncHandler<Service>>) -> Self {
        self.service_handler = handler;
        self
    }

    /// Replace the Endpoints handler
    pub fn with_endpoints_handler(mut self, handler: Arc<dyn SyncHandler<Endpoints>>) -> Self {
        self.endpoints_handler = handler;
        self
    }

    /// Dispatch one key and classify the result.
    ///
    /// Reporting to the error sink happens here; the caller only applies
    /// queue policy based on the returned outcome.
    pub async fn sync(&self, raw_key: &str) -> SyncOutcome {
        let key = match WorkKey::parse(raw_key) {
            Ok(key) => key,
            Err(err) => {
                // A key the translator never built means a bug upstream, not
                // bad cluster state. Loud log, permanent drop.
                error!(key = raw_key, error = %err, "Dropping malformed work key");
                self.sink.report_error(&err);
                return SyncOutcome::InvalidKey;
            }
        };

        match key.kind() {
            Some(ResourceKind::Service) => {
                self.sync_kind(ResourceKind::Service, &key, &self.services, &*self.service_handler)
                    .await
            }
            Some(ResourceKind::Endpoints) => {
                self.sync_kind(
                    ResourceKind::Endpoints,
                    &key,
                    &self.endpoints,
                    &*self.endpoints_handler,
                )
                .await
            }
            // Unrecognized kinds are skipped, not errored, so keys written by
            // a newer translator cannot wedge the queue.
            None => {
                debug!(key = %key, "Ignoring key with unrecognized kind");
                SyncOutcome::SkippedUnknownKind
            }
        }
    }

    async fn sync_kind<T>(
        &self,
        kind: ResourceKind,
        key: &WorkKey,
        cache: &ObjectCache<T>,
        handler: &dyn SyncHandler<T>,
    ) -> SyncOutcome {
        debug!(kind = %kind, namespace = key.namespace(), name = key.name(), "Dispatching sync");

        let Some(obj) = cache.get(key.namespace(), key.name()) else {
            info!(
                kind = %kind,
                namespace = key.namespace(),
                name = key.name(),
                "Object in work queue no longer exists"
            );
            return SyncOutcome::Gone;
        };

        match handler.sync(key.namespace(), key.name(), obj).await {
            Ok(()) => {
                self.sink.record_event(kind, REASON_SYNCED, MESSAGE_SYNCED);
                SyncOutcome::Synced
            }
            Err(err) => {
                let err = Error::sync(format!("error syncing '{key}': {err}"));
                self.sink.report_error(&err);
                SyncOutcome::Failed(err)
            }
        }
    }
}
