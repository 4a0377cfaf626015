//! Error and event reporting sink
//!
//! Trait-based abstraction over process-wide error reporting and
//! user-visible event recording. Both calls are **fire-and-forget**: a sink
//! must never block the reconciliation loop and never fail. The default
//! implementation writes structured tracing records; tests substitute mocks.

use tracing::{error, info};

#[cfg(test)]
use mockall::automock;

use crate::error::Error;
use crate::key::ResourceKind;

/// Process-wide sink for non-fatal errors and user-visible status events.
///
/// Implementations must be non-blocking and infallible from the caller's
/// point of view; a sink that cannot deliver logs a warning internally.
#[cfg_attr(test, automock)]
pub trait EventSink: Send + Sync {
    /// Report a contained, non-fatal error.
    ///
    /// Called for translator failures, transient sync errors, and malformed
    /// keys. Never called for the fatal cache-sync failure, which propagates
    /// out of `Controller::run` instead.
    fn report_error(&self, err: &Error);

    /// Record a user-visible status event for a resource kind
    fn record_event(&self, kind: ResourceKind, reason: &str, message: &str);
}

/// Default sink backed by the tracing subscriber
pub struct TracingSink;

impl EventSink for TracingSink {
    fn report_error(&self, err: &Error) {
        error!(error = %err, "Reconciliation error");
    }

    fn record_event(&self, kind: ResourceKind, reason: &str, message: &str) {
        info!(kind = %kind, reason, message, "Event");
    }
}
