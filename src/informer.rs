//! Informer driver
//!
//! Plumbing between the Kubernetes watch API and the reconciliation engine:
//! mirrors watch events for one kind into the local [`ObjectCache`] and
//! notifies the [`EventTranslator`]. The watch mechanics (list/relist,
//! retries) belong to `kube::runtime::watcher`; this driver only interprets
//! its events.
//!
//! Delivery is at-least-once and unordered across kinds, which is exactly
//! what the engine assumes: a replayed event at worst re-enqueues a key the
//! dispatcher will sync idempotently.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ObjectCache, ObjectId};
use crate::error::Error;
use crate::key::ResourceKind;
use crate::sink::EventSink;
use crate::translator::EventTranslator;

/// Run one kind's watch loop until the shutdown signal fires.
///
/// Watch errors are reported to the sink and the stream is polled again;
/// the watcher re-establishes itself, so a flaky API server degrades to
/// delayed notifications rather than a dead informer.
pub async fn run_informer<K>(
    kind: ResourceKind,
    api: Api<K>,
    cache: Arc<ObjectCache<K>>,
    translator: Arc<EventTranslator>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    info!(kind = %kind, "Starting informer");
    let mut stream = watcher::watcher(api, watcher::Config::default()).boxed();
    let mut listing = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(kind = %kind, "Informer stopped");
                return;
            }
            event = stream.try_next() => match event {
                Ok(Some(event)) => handle_event(kind, &cache, &translator, &mut listing, event),
                Ok(None) => {
                    warn!(kind = %kind, "Watch stream ended");
                    return;
                }
                Err(err) => {
                    sink.report_error(&Error::watch(format!("{kind} watch: {err}")));
                }
            }
        }
    }
}

/// Apply one watch event to the cache and raise the matching notification.
///
/// The `Init`..`InitDone` sequence is a full snapshot replacement, not a
/// delta stream. `listing` buffers the identities replayed between those
/// two markers so `InitDone` can evict everything the new listing did not
/// mention: objects deleted while the watch was disconnected produce no
/// `Delete` event, eviction at the end of the relist is their only exit.
fn handle_event<K>(
    kind: ResourceKind,
    cache: &ObjectCache<K>,
    translator: &EventTranslator,
    listing: &mut Option<HashSet<ObjectId>>,
    event: Event<K>,
) where
    K: Resource + Clone,
    K::DynamicType: Default,
{
    match event {
        Event::Init => {
            *listing = Some(HashSet::new());
        }
        Event::InitApply(obj) => {
            if let (Some(listing), Some(name)) = (listing.as_mut(), obj.meta().name.clone()) {
                listing.insert((obj.namespace().unwrap_or_default(), name));
            }
            // Diff against the prior snapshot just like Apply: on a relist
            // most objects are unchanged and the translator's version filter
            // keeps them out of the queue.
            match upsert(cache, &obj) {
                Some(prev) => translator.on_update(kind, prev.as_ref(), &obj),
                None => translator.on_add(kind, &obj),
            }
        }
        Event::InitDone => {
            if let Some(listed) = listing.take() {
                let evicted = cache.evict_unlisted(&listed);
                if evicted > 0 {
                    info!(kind = %kind, evicted, "Evicted objects deleted during watch outage");
                }
            }
            info!(kind = %kind, count = cache.len(), "Informer cache synced");
            cache.mark_synced();
        }
        Event::Apply(obj) => match upsert(cache, &obj) {
            Some(prev) => translator.on_update(kind, prev.as_ref(), &obj),
            None => translator.on_add(kind, &obj),
        },
        Event::Delete(obj) => {
            if let Some(name) = obj.meta().name.as_deref() {
                let namespace = obj.namespace().unwrap_or_default();
                debug!(kind = %kind, namespace = %namespace, name, "Evicting deleted object");
                cache.remove(&namespace, name);
            }
        }
    }
}

/// Store a snapshot, returning the previous one if the object was known.
///
/// Objects without a name cannot be cached; they fall through to the
/// translator, which reports the missing metadata.
fn upsert<K>(cache: &ObjectCache<K>, obj: &K) -> Option<Arc<K>>
where
    K: Resource + Clone,
    K::DynamicType: Default,
{
    let name = obj.meta().name.clone()?;
    let namespace = obj.namespace().unwrap_or_default();
    cache.insert(namespace, name, obj.clone())
}
