//! Event translation
//!
//! Converts raw add/update notifications from the informer collaborator into
//! canonical `Kind/Namespace/Name` work keys and enqueues them through the
//! rate limiter. Update notifications whose resource version did not change
//! (periodic resyncs, relists) are filtered here, bounding queue churn.
//!
//! Translation failures (an object missing its name or namespace) are
//! reported to the error sink and the notification is dropped; they are never
//! fatal to the watch.

use std::sync::Arc;

use kube::{Resource, ResourceExt};
use tracing::{debug, trace};

use crate::error::Error;
use crate::key::{ResourceKind, WorkKey};
use crate::queue::WorkQueue;
use crate::sink::EventSink;

/// Translates informer notifications into work queue keys.
pub struct EventTranslator {
    queue: WorkQueue<String>,
    sink: Arc<dyn EventSink>,
}

impl EventTranslator {
    /// Create a translator feeding the given queue
    pub fn new(queue: WorkQueue<String>, sink: Arc<dyn EventSink>) -> Self {
        Self { queue, sink }
    }

    /// Handle an add notification: always enqueue
    pub fn on_add<T: ResourceExt>(&self, kind: ResourceKind, obj: &T) {
        self.enqueue(kind, obj);
    }

    /// Handle an update notification.
    ///
    /// Enqueues only when the resource version changed; an unchanged version
    /// means a resync notification carrying no real change. This leans on the
    /// API server's contract that the version changes on every meaningful
    /// update; if a version were ever reused, that update would be dropped
    /// here.
    pub fn on_update<T: ResourceExt>(&self, kind: ResourceKind, old: &T, new: &T) {
        if old.resource_version() == new.resource_version() {
            trace!(
                kind = %kind,
                name = %new.name_any(),
                "Resource version unchanged, skipping resync notification"
            );
            return;
        }
        self.enqueue(kind, new);
    }

    fn enqueue<T: ResourceExt>(&self, kind: ResourceKind, obj: &T) {
        let Some(name) = obj.meta().name.clone() else {
            self.sink.report_error(&Error::missing_metadata(format!(
                "{kind} object has no name"
            )));
            return;
        };
        // Services and Endpoints are namespaced; a missing namespace is
        // malformed metadata, not a cluster-scoped object.
        let Some(namespace) = obj.namespace() else {
            self.sink.report_error(&Error::missing_metadata(format!(
                "{kind} object '{name}' has no namespace"
            )));
            return;
        };
        let key = WorkKey::new(kind, namespace, name).to_string();
        debug!(key = %key, "Enqueueing");
        self.queue.add_rate_limited(key);
    }
}
