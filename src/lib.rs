//! svcwatch - level-triggered Service/Endpoints reconciliation controller
//!
//! svcwatch watches a namespace's Services and Endpoints and converges
//! observed state toward desired state by running idempotent sync handlers.
//! The heart of the crate is the reconciliation engine: watch notifications
//! are translated into `Kind/Namespace/Name` keys, deduplicated and
//! rate-limited by a work queue, and drained by a pool of workers that route
//! each key to its kind's handler.
//!
//! # Modules
//!
//! - [`queue`] - rate-limited, deduplicating work queue (the engine's single
//!   synchronization point)
//! - [`key`] - canonical work keys and the kinds they route to
//! - [`translator`] - watch notification to work key translation
//! - [`dispatch`] - key routing, outcome classification, sync handlers
//! - [`worker`] - the worker pool draining the queue
//! - [`controller`] - lifecycle orchestration (cache sync, run, drain)
//! - [`cache`] - local read-only object cache fed by the informer driver
//! - [`informer`] - kube watch stream to cache/translator plumbing
//! - [`sink`] - process-wide error reporting and event recording
//! - [`config`] - owned runtime configuration
//! - [`error`] - error taxonomy

#![deny(missing_docs)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod informer;
pub mod key;
pub mod queue;
pub mod sink;
pub mod translator;
pub mod worker;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

/// Default namespace watched when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKERS: usize = 2;

/// Default initial per-key retry backoff
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(5);

/// Default maximum per-key retry backoff
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1000);
