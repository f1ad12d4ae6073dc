//! In-Memory Backend
//!
//! Node stores held entirely in process memory, one independent store per
//! cluster node. No state survives teardown, which makes this the default
//! backend for fixture tests and quick benchmark smoke runs.
//!
//! The provisioner carries a deterministic fault plan: tests can force
//! construction to fail at an exact node, or with a seeded probability, and
//! replay the identical failure from the same seed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};

use super::descriptor::{BackendDescriptor, BackendKind};
use super::provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};

// =============================================================================
// MemoryFaults
// =============================================================================

/// Deterministic fault plan for the in-memory provisioner.
///
/// Same seed, same plan, same failures.
#[derive(Debug, Clone)]
pub struct MemoryFaults {
    seed: u64,
    fail_at_node: Option<usize>,
    failure_probability: f64,
}

impl MemoryFaults {
    /// Create a plan that injects nothing, under the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            fail_at_node: None,
            failure_probability: 0.0,
        }
    }

    /// Force construction of exactly this node to fail.
    #[must_use]
    pub fn fail_at_node(mut self, node_id: usize) -> Self {
        self.fail_at_node = Some(node_id);
        self
    }

    /// Fail each node's construction with this probability.
    ///
    /// # Panics
    /// Panics if the probability is not in [0, 1].
    #[must_use]
    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        self.failure_probability = probability;
        self
    }
}

impl Default for MemoryFaults {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

// =============================================================================
// MemoryEngine
// =============================================================================

/// One in-memory node store.
#[derive(Debug)]
pub struct MemoryEngine {
    node_id: usize,
    cache_size_bytes: usize,
    records: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    extensions: ExtensionRegistry,
    open: bool,
}

impl MemoryEngine {
    fn new(node_id: usize, cache_size_bytes: usize) -> Self {
        Self {
            node_id,
            cache_size_bytes,
            records: Arc::new(RwLock::new(HashMap::new())),
            extensions: ExtensionRegistry::new(),
            open: true,
        }
    }

    /// Configured node-store cache size.
    #[must_use]
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_size_bytes
    }

    /// Store a record under a path.
    ///
    /// # Errors
    /// `Storage` if the engine has been shut down.
    pub fn write_record(&self, path: impl Into<String>, data: Vec<u8>) -> EngineResult<()> {
        if !self.open {
            return Err(EngineError::storage("store is closed"));
        }
        self.records
            .write()
            .expect("record lock poisoned")
            .insert(path.into(), data);
        Ok(())
    }

    /// Read a record back by path.
    ///
    /// # Errors
    /// `Storage` if the engine has been shut down.
    pub fn read_record(&self, path: &str) -> EngineResult<Option<Vec<u8>>> {
        if !self.open {
            return Err(EngineError::storage("store is closed"));
        }
        Ok(self
            .records
            .read()
            .expect("record lock poisoned")
            .get(path)
            .cloned())
    }
}

#[async_trait]
impl EngineInstance for MemoryEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn node_id(&self) -> usize {
        self.node_id
    }

    fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    fn supports_graceful_shutdown(&self) -> bool {
        true
    }

    async fn shutdown(&mut self) -> EngineResult<()> {
        if self.open {
            self.records.write().expect("record lock poisoned").clear();
            self.open = false;
            tracing::debug!(node_id = self.node_id, "memory store closed");
        }
        Ok(())
    }
}

// =============================================================================
// MemoryProvisioner
// =============================================================================

/// Provisions independent in-memory node stores.
#[derive(Debug)]
pub struct MemoryProvisioner {
    descriptor: BackendDescriptor,
    faults: MemoryFaults,
    rng: ChaCha20Rng,
}

impl MemoryProvisioner {
    /// Create a provisioner with no fault plan.
    #[must_use]
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self::with_faults(descriptor, MemoryFaults::default())
    }

    /// Create a provisioner with a deterministic fault plan.
    #[must_use]
    pub fn with_faults(descriptor: BackendDescriptor, faults: MemoryFaults) -> Self {
        let rng = ChaCha20Rng::seed_from_u64(faults.seed);
        Self {
            descriptor,
            faults,
            rng,
        }
    }

    fn should_fail(&mut self, node_id: usize) -> bool {
        if self.faults.fail_at_node == Some(node_id) {
            return true;
        }
        self.faults.failure_probability > 0.0
            && self.rng.gen_bool(self.faults.failure_probability)
    }
}

#[async_trait]
impl BackendProvisioner for MemoryProvisioner {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision_node(&mut self, node_id: usize) -> ProvisionResult<Box<dyn EngineInstance>> {
        if self.should_fail(node_id) {
            return Err(ProvisionError::node(
                node_id,
                EngineError::injected("memory_store_construct_fail"),
            ));
        }
        let engine = MemoryEngine::new(node_id, self.descriptor.cache_size_bytes());
        tracing::debug!(node_id, "memory store provisioned");
        Ok(Box::new(engine))
    }

    async fn tear_down(&mut self) -> ProvisionResult<()> {
        // Engines own all state; nothing backend-level to release.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> BackendDescriptor {
        BackendDescriptor::memory(1024 * 1024).unwrap()
    }

    #[tokio::test]
    async fn test_set_up_returns_n_engines() {
        let mut provisioner = MemoryProvisioner::new(descriptor());
        let engines = provisioner.set_up(3).await.unwrap();
        assert_eq!(engines.len(), 3);
        for (i, engine) in engines.iter().enumerate() {
            assert_eq!(engine.node_id(), i);
            assert_eq!(engine.kind(), BackendKind::Memory);
        }
    }

    #[tokio::test]
    async fn test_boxed_engines_format_for_diagnostics() {
        let mut provisioner = MemoryProvisioner::new(descriptor());
        let engines = provisioner.set_up(1).await.unwrap();
        assert!(format!("{:?}", engines[0]).contains("MemoryEngine"));

        let boxed: Box<dyn BackendProvisioner> = Box::new(provisioner);
        assert!(format!("{boxed:?}").contains("MemoryProvisioner"));
    }

    #[tokio::test]
    async fn test_set_up_zero_is_empty() {
        let mut provisioner = MemoryProvisioner::new(descriptor());
        let engines = provisioner.set_up(0).await.unwrap();
        assert!(engines.is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_until_shutdown() {
        let mut engine = MemoryEngine::new(0, 1024);
        engine.write_record("/content/a", vec![1, 2, 3]).unwrap();
        assert_eq!(
            engine.read_record("/content/a").unwrap(),
            Some(vec![1, 2, 3])
        );

        engine.shutdown().await.unwrap();
        assert!(engine.read_record("/content/a").is_err());
        // Idempotent.
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_at_exact_node() {
        let faults = MemoryFaults::with_seed(42).fail_at_node(1);
        let mut provisioner = MemoryProvisioner::with_faults(descriptor(), faults);

        let err = provisioner.set_up(3).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Node { node_id: 1, .. }));
    }

    #[tokio::test]
    async fn test_fault_probability_is_deterministic() {
        let run = |seed| async move {
            let faults = MemoryFaults::with_seed(seed).with_failure_probability(0.5);
            let mut provisioner = MemoryProvisioner::with_faults(descriptor(), faults);
            provisioner.set_up(8).await.map(|engines| engines.len())
        };

        let first = run(7).await;
        let second = run(7).await;
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (
                Err(ProvisionError::Node { node_id: a, .. }),
                Err(ProvisionError::Node { node_id: b, .. }),
            ) => assert_eq!(a, b),
            _ => panic!("same seed must replay the same outcome"),
        }
    }

    #[tokio::test]
    async fn test_tear_down_is_idempotent() {
        let mut provisioner = MemoryProvisioner::new(descriptor());
        provisioner.tear_down().await.unwrap();
        provisioner.tear_down().await.unwrap();
    }

    #[tokio::test]
    async fn test_cluster_too_large() {
        let mut provisioner = MemoryProvisioner::new(descriptor());
        let err = provisioner
            .set_up(crate::constants::CLUSTER_SIZE_COUNT_MAX + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ClusterTooLarge { .. }));
    }
}
