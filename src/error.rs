//! Error types for the svcwatch controller

use thiserror::Error;

/// Main error type for svcwatch operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The informer caches never reported synced before shutdown was requested
    #[error("cache sync failed: {0}")]
    CacheSyncFailed(String),

    /// A work key that does not parse as `Kind/Namespace/Name`
    #[error("malformed work key: {0}")]
    MalformedKey(String),

    /// Transient failure reconciling a resource; retried with backoff
    #[error("sync error: {0}")]
    Sync(String),

    /// Watch stream error from the informer driver
    #[error("watch error: {0}")]
    Watch(String),

    /// A notification carried an object missing required metadata
    #[error("missing object metadata: {0}")]
    MissingMetadata(String),
}

impl Error {
    /// Create a cache-sync error with the given message
    pub fn cache_sync(msg: impl Into<String>) -> Self {
        Self::CacheSyncFailed(msg.into())
    }

    /// Create a malformed-key error with the given message
    pub fn malformed_key(msg: impl Into<String>) -> Self {
        Self::MalformedKey(msg.into())
    }

    /// Create a transient sync error with the given message
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create a watch error with the given message
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a missing-metadata error with the given message
    pub fn missing_metadata(msg: impl Into<String>) -> Self {
        Self::MissingMetadata(msg.into())
    }
}
