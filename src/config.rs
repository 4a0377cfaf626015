//! Controller configuration
//!
//! One owned struct built at startup and passed into the wiring, no
//! process-wide mutable globals. The CLI surface lives in `main.rs`; this
//! module only defines the runtime shape.

use std::time::Duration;

use crate::{DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_NAMESPACE, DEFAULT_WORKERS};

/// Runtime configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace whose Services and Endpoints are watched
    pub namespace: String,
    /// Number of concurrent reconcile workers
    pub workers: usize,
    /// Initial per-key retry backoff
    pub base_backoff: Duration,
    /// Maximum per-key retry backoff
    pub max_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            workers: DEFAULT_WORKERS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_crate_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.workers, 2);
        assert_eq!(config.base_backoff, Duration::from_millis(5));
        assert_eq!(config.max_backoff, Duration::from_secs(1000));
    }
}
