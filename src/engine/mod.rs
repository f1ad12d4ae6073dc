//! Engine Instances
//!
//! An engine instance is the live, backend-specific object a repository
//! handle is built on top of: an in-memory store, a connection to a networked
//! document store, a relational pool, a segment file store, or a multiplexed
//! overlay of mounts.
//!
//! All implementations satisfy the same [`EngineInstance`] contract:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EngineInstance Trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!      ↑              ↑               ↑               ↑
//! ┌────┴─────┐ ┌──────┴──────┐ ┌──────┴──────┐ ┌──────┴───────┐
//! │ Memory   │ │ SegmentFile │ │ Composite   │ │ Document/RDB │
//! │ (testing)│ │ (embedded)  │ │ (overlay)   │ │ (server)     │
//! └──────────┘ └─────────────┘ └─────────────┘ └──────────────┘
//! ```
//!
//! Graceful shutdown is an explicit optional capability
//! ([`EngineInstance::supports_graceful_shutdown`]) checked before invocation,
//! never inferred from the concrete type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::backend::BackendKind;

// =============================================================================
// Errors
// =============================================================================

/// Errors from engine construction and shutdown.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to reach or authenticate against a networked store
    #[error("connection error: {message}")]
    Connection {
        /// Driver-level failure description
        message: String,
    },

    /// File-resident state could not be created or released
    #[error("io error: {message}")]
    Io {
        /// Underlying I/O failure description
        message: String,
    },

    /// The storage engine itself reported a failure
    #[error("storage error: {message}")]
    Storage {
        /// Engine-level failure description
        message: String,
    },

    /// A deterministic test fault was injected
    #[error("injected fault: {fault}")]
    Injected {
        /// Name of the injected fault
        fault: String,
    },
}

impl EngineError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an I/O error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an injected-fault error.
    #[must_use]
    pub fn injected(fault: impl Into<String>) -> Self {
        Self::Injected {
            fault: fault.into(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// ExtensionRegistry
// =============================================================================

struct Extension {
    service: Arc<dyn Any + Send + Sync>,
    metadata: HashMap<String, String>,
}

/// Per-engine service registry.
///
/// Backend-agnostic extension point: the fixture registers the statistics
/// sink here before the customization hook runs, and hooks may register or
/// look up further services per node.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: HashMap<String, Extension>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance under `service_kind` with optional metadata.
    ///
    /// Re-registering a kind replaces the previous entry.
    pub fn register(
        &mut self,
        service_kind: impl Into<String>,
        service: Arc<dyn Any + Send + Sync>,
        metadata: HashMap<String, String>,
    ) {
        self.entries
            .insert(service_kind.into(), Extension { service, metadata });
    }

    /// Look up a service by kind, downcasting to its concrete type.
    ///
    /// Returns `None` if the kind is absent or holds a different type.
    #[must_use]
    pub fn lookup<T: Any + Send + Sync>(&self, service_kind: &str) -> Option<Arc<T>> {
        self.entries
            .get(service_kind)
            .and_then(|entry| Arc::clone(&entry.service).downcast::<T>().ok())
    }

    /// Metadata attached to a registered service kind.
    #[must_use]
    pub fn metadata(&self, service_kind: &str) -> Option<&HashMap<String, String>> {
        self.entries.get(service_kind).map(|entry| &entry.metadata)
    }

    /// Whether a service kind is registered.
    #[must_use]
    pub fn contains(&self, service_kind: &str) -> bool {
        self.entries.contains_key(service_kind)
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("kinds", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// EngineInstance
// =============================================================================

/// One running storage engine, owned exclusively by its fixture.
///
/// Never shared across clusters. Once wrapped into a repository handle it may
/// be used per the concurrency contract of the underlying storage engine; the
/// fixture itself only touches it during provisioning and teardown.
#[async_trait]
pub trait EngineInstance: Send + Sync + fmt::Debug {
    /// The backend kind this engine belongs to.
    fn kind(&self) -> BackendKind;

    /// Position of this engine within its cluster, in provisioning order.
    fn node_id(&self) -> usize;

    /// The engine's extension registry.
    fn extensions(&self) -> &ExtensionRegistry;

    /// Mutable access to the engine's extension registry.
    fn extensions_mut(&mut self) -> &mut ExtensionRegistry;

    /// Whether this engine supports graceful shutdown.
    ///
    /// Checked before [`shutdown`](Self::shutdown) is invoked; engines that
    /// release everything on drop return `false`.
    fn supports_graceful_shutdown(&self) -> bool {
        false
    }

    /// Gracefully release this engine's resources.
    ///
    /// Must be idempotent. Default is a no-op for engines without the
    /// capability.
    async fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry.is_empty());

        registry.register("counter", Arc::new(42_u64), HashMap::new());
        assert!(registry.contains("counter"));
        assert_eq!(registry.len(), 1);

        let value = registry.lookup::<u64>("counter").expect("registered");
        assert_eq!(*value, 42);
    }

    #[test]
    fn test_registry_lookup_wrong_type_is_none() {
        let mut registry = ExtensionRegistry::new();
        registry.register("counter", Arc::new(42_u64), HashMap::new());

        assert!(registry.lookup::<String>("counter").is_none());
        assert!(registry.lookup::<u64>("missing").is_none());
    }

    #[test]
    fn test_registry_replaces_on_reregister() {
        let mut registry = ExtensionRegistry::new();
        registry.register("counter", Arc::new(1_u64), HashMap::new());
        registry.register("counter", Arc::new(2_u64), HashMap::new());

        assert_eq!(registry.len(), 1);
        assert_eq!(*registry.lookup::<u64>("counter").expect("registered"), 2);
    }

    #[test]
    fn test_registry_metadata() {
        let mut registry = ExtensionRegistry::new();
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "fixture".to_string());
        registry.register("counter", Arc::new(1_u64), metadata);

        let stored = registry.metadata("counter").expect("registered");
        assert_eq!(stored.get("source").map(String::as_str), Some("fixture"));
        assert!(registry.metadata("missing").is_none());
    }

    #[test]
    fn test_engine_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EngineError::from(io);
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
