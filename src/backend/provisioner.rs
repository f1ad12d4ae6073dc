//! Backend Provisioners
//!
//! One provisioner implementation per backend kind. A provisioner turns a
//! validated descriptor into N engine instances and later releases every
//! resource it created, including networked and file-resident state.
//!
//! Construction is all-or-nothing: if any of the N instances fails, the
//! instances already built in the same call are torn down before the error
//! surfaces. Teardown is idempotent.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::CLUSTER_SIZE_COUNT_MAX;
use crate::engine::{EngineError, EngineInstance};

use super::descriptor::BackendDescriptor;

// =============================================================================
// Errors
// =============================================================================

/// Errors from backend provisioning and release.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A node's engine failed to construct
    #[error("node {node_id} failed to provision: {source}")]
    Node {
        /// Index of the failing node
        node_id: usize,
        /// Underlying engine failure
        #[source]
        source: EngineError,
    },

    /// Backend-level resources failed to release
    #[error("backend teardown failed: {message}")]
    Teardown {
        /// What failed to release
        message: String,
    },

    /// Requested cluster size exceeds what the backend can address
    #[error("cluster size {requested} exceeds limit {limit}")]
    ClusterTooLarge {
        /// Requested node count
        requested: usize,
        /// Addressable maximum
        limit: usize,
    },
}

impl ProvisionError {
    /// Create a node-construction error.
    #[must_use]
    pub fn node(node_id: usize, source: EngineError) -> Self {
        Self::Node { node_id, source }
    }

    /// Create a teardown error.
    #[must_use]
    pub fn teardown(message: impl Into<String>) -> Self {
        Self::Teardown {
            message: message.into(),
        }
    }
}

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

// =============================================================================
// BackendProvisioner
// =============================================================================

/// Constructs and releases the engine instances for one cluster.
///
/// Implementations provide [`provision_node`](Self::provision_node) and
/// [`tear_down`](Self::tear_down); the all-or-nothing [`set_up`](Self::set_up)
/// loop with rollback is shared.
#[async_trait]
pub trait BackendProvisioner: Send + fmt::Debug {
    /// The descriptor this provisioner was built from.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Cheap feasibility check: can this backend address `n` nodes?
    ///
    /// Must not provision anything or have side effects.
    fn is_available(&self, n: usize) -> bool {
        n <= CLUSTER_SIZE_COUNT_MAX
    }

    /// Construct the engine for one node.
    ///
    /// A connection failure is terminal for the attempt; retry policy is the
    /// backend driver's concern, never this provisioner's.
    async fn provision_node(
        &mut self,
        node_id: usize,
    ) -> ProvisionResult<Box<dyn EngineInstance>>;

    /// Release backend-level resources.
    ///
    /// Idempotent: calling twice, or with nothing set up, must not fail or
    /// double-free. For server-backed kinds, `drop_store_after_test` decides
    /// whether server-side state is purged or left for inspection.
    async fn tear_down(&mut self) -> ProvisionResult<()>;

    /// Construct `n` engines, all-or-nothing.
    ///
    /// `n == 0` is valid and yields an empty cluster. On any node failure the
    /// engines already built in this call are shut down and backend resources
    /// released before the error surfaces, so no partial cluster leaks.
    async fn set_up(&mut self, n: usize) -> ProvisionResult<Vec<Box<dyn EngineInstance>>> {
        if !self.is_available(n) {
            return Err(ProvisionError::ClusterTooLarge {
                requested: n,
                limit: CLUSTER_SIZE_COUNT_MAX,
            });
        }

        let mut engines: Vec<Box<dyn EngineInstance>> = Vec::with_capacity(n);
        for node_id in 0..n {
            match self.provision_node(node_id).await {
                Ok(engine) => engines.push(engine),
                Err(err) => {
                    tracing::warn!(
                        backend = %self.descriptor(),
                        node_id,
                        error = %err,
                        "node provisioning failed, rolling back"
                    );
                    for engine in engines.iter_mut().rev() {
                        if engine.supports_graceful_shutdown() {
                            if let Err(shutdown_err) = engine.shutdown().await {
                                tracing::warn!(
                                    node_id = engine.node_id(),
                                    error = %shutdown_err,
                                    "rollback shutdown failed"
                                );
                            }
                        }
                    }
                    if let Err(teardown_err) = self.tear_down().await {
                        tracing::warn!(
                            error = %teardown_err,
                            "backend teardown during rollback failed"
                        );
                    }
                    return Err(err);
                }
            }
        }
        Ok(engines)
    }
}
