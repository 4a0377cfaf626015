//! Work item keys
//!
//! Every reconciliation target is identified by a canonical string key of the
//! form `Kind/Namespace/Name`. The Event Translator decides the kind tag once
//! when it builds the key; the Sync Dispatcher parses the string back into a
//! [`WorkKey`] exactly once, so nothing downstream inspects raw strings again.

use std::fmt;

use crate::error::Error;

/// Resource kinds this controller watches and routes to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `core/v1` Service
    Service,
    /// `core/v1` Endpoints
    Endpoints,
}

impl ResourceKind {
    /// The kind label used as the first key segment
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Endpoints => "Endpoints",
        }
    }

    /// Look up a kind by its key-segment label.
    ///
    /// Returns `None` for labels this controller does not recognize; callers
    /// treat those as a silent skip rather than an error so that keys written
    /// by a newer translator never wedge the queue.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Service" => Some(Self::Service),
            "Endpoints" => Some(Self::Endpoints),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed work item key: kind tag plus object identity.
///
/// The kind is kept as the raw label so that unrecognized kinds survive the
/// parse and can be skipped deliberately; [`WorkKey::kind`] resolves it
/// against the known [`ResourceKind`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkKey {
    kind_label: String,
    namespace: String,
    name: String,
}

impl WorkKey {
    /// Build a key for a known kind. Used by the Event Translator.
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind_label: kind.as_str().to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a raw queue item into a key.
    ///
    /// A wrong segment count or an empty segment is a [`Error::MalformedKey`]:
    /// the queue only ever carries keys the translator built, so a parse
    /// failure indicates a bug, and the item is dropped rather than retried.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = raw.split('/').collect();
        match parts[..] {
            [kind, namespace, name] if !kind.is_empty() && !namespace.is_empty() && !name.is_empty() => {
                Ok(Self {
                    kind_label: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(Error::malformed_key(format!(
                "expected 'Kind/Namespace/Name', got '{raw}'"
            ))),
        }
    }

    /// The resolved kind, or `None` if the label is not one we handle
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::parse(&self.kind_label)
    }

    /// The raw kind label as it appeared in the key
    pub fn kind_label(&self) -> &str {
        &self.kind_label
    }

    /// Namespace segment
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name segment
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind_label, self.namespace, self.name)
    }
}
