//! Repository Fixtures - Cluster Lifecycle Manager
//!
//! The orchestrator behind one benchmark run: given a backend descriptor it
//! provisions N repository handles, binds the statistics sink into every
//! engine before per-node customization runs, and guarantees orderly,
//! idempotent teardown regardless of backend kind.
//!
//! # Lifecycle
//!
//! ```text
//! Unprovisioned ─ set_up_cluster ─▶ Provisioning ──▶ Live
//!       ▲                               │              │
//!       └────────── rollback ◀──────────┘              │
//!       ▲                                              │
//!       └───────────── TearingDown ◀── tear_down_cluster
//! ```
//!
//! `Provisioning` is transient and only observable through failure: on any
//! error the whole cluster rolls back and the fixture again holds zero
//! handles. There is no path from `Live` back into `Provisioning` without an
//! intervening teardown. Lifecycle methods take `&mut self`, so callers
//! serialize them by construction.
//!
//! # Example
//!
//! ```rust
//! use quarry::{BackendDescriptor, RepositoryFixture};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = BackendDescriptor::memory(16 * 1024 * 1024)?;
//! let mut fixture = RepositoryFixture::new(descriptor)?;
//!
//! let handles = fixture.set_up_cluster(3).await?;
//! assert_eq!(handles.len(), 3);
//!
//! fixture.tear_down_cluster().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{BackendDescriptor, BackendKind, BackendProvisioner};
use crate::constants::STATISTICS_SERVICE_KIND;
use crate::engine::{EngineInstance, EngineResult};
use crate::error::{FixtureError, FixtureResult};
use crate::stats::{NoopStatisticsSink, StatisticsBinding, StatisticsSink};

// =============================================================================
// RepositoryHandle
// =============================================================================

/// One usable repository node: the engine plus node-level metadata.
///
/// Owned by the fixture that built it; never shared across clusters.
pub struct RepositoryHandle {
    node_id: usize,
    engine: Box<dyn EngineInstance>,
    metadata: HashMap<String, String>,
}

impl RepositoryHandle {
    /// Position of this node within the cluster, in provisioning order.
    #[must_use]
    pub fn node_id(&self) -> usize {
        self.node_id
    }

    /// Backend kind backing this node.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.engine.kind()
    }

    /// The engine this repository is built on.
    #[must_use]
    pub fn engine(&self) -> &dyn EngineInstance {
        self.engine.as_ref()
    }

    /// Node-level metadata set by the customization hook.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Whether this node supports graceful shutdown.
    #[must_use]
    pub fn supports_graceful_shutdown(&self) -> bool {
        self.engine.supports_graceful_shutdown()
    }

    async fn shutdown(&mut self) -> EngineResult<()> {
        self.engine.shutdown().await
    }

    fn into_engine(self) -> Box<dyn EngineInstance> {
        self.engine
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("node_id", &self.node_id)
            .field("kind", &self.engine.kind())
            .field("metadata", &self.metadata)
            .finish()
    }
}

// =============================================================================
// RepositoryBuilder
// =============================================================================

/// Per-node builder handed to the customization hook.
///
/// The statistics sink is already bound when the hook runs, so custom logic
/// can see instrumentation. The hook may adjust the engine's extensions or
/// attach node-level metadata; the fixture then builds the handle.
pub struct RepositoryBuilder {
    engine: Box<dyn EngineInstance>,
    metadata: HashMap<String, String>,
}

impl RepositoryBuilder {
    fn new(engine: Box<dyn EngineInstance>) -> Self {
        Self {
            engine,
            metadata: HashMap::new(),
        }
    }

    /// Position of this node within the cluster.
    #[must_use]
    pub fn node_id(&self) -> usize {
        self.engine.node_id()
    }

    /// The engine under construction.
    #[must_use]
    pub fn engine(&self) -> &dyn EngineInstance {
        self.engine.as_ref()
    }

    /// Mutable engine access, e.g. to register further extensions.
    pub fn engine_mut(&mut self) -> &mut dyn EngineInstance {
        self.engine.as_mut()
    }

    /// Attach node-level metadata, visible on the finished handle.
    pub fn with_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn build(self) -> RepositoryHandle {
        RepositoryHandle {
            node_id: self.engine.node_id(),
            engine: self.engine,
            metadata: self.metadata,
        }
    }

    fn into_engine(self) -> Box<dyn EngineInstance> {
        self.engine
    }
}

// =============================================================================
// RepositoryFixture
// =============================================================================

/// Provisions, customizes, and tears down one repository cluster.
///
/// At most one cluster is live per fixture; provisioning a second without an
/// intervening teardown is rejected with [`FixtureError::ClusterActive`].
pub struct RepositoryFixture {
    descriptor: BackendDescriptor,
    provisioner: Box<dyn BackendProvisioner>,
    statistics: Arc<dyn StatisticsSink>,
    cluster: Option<Vec<RepositoryHandle>>,
}

impl RepositoryFixture {
    /// Create a fixture for a descriptor, resolving its provisioner.
    ///
    /// # Errors
    /// `InvalidConfiguration` when the descriptor's backend support is not
    /// compiled into this build.
    pub fn new(descriptor: BackendDescriptor) -> FixtureResult<Self> {
        let provisioner = descriptor.provisioner()?;
        Ok(Self::with_provisioner(descriptor, provisioner))
    }

    /// Create a fixture with an explicit provisioner.
    ///
    /// Tests use this to inject failing or instrumented provisioners.
    #[must_use]
    pub fn with_provisioner(
        descriptor: BackendDescriptor,
        provisioner: Box<dyn BackendProvisioner>,
    ) -> Self {
        Self {
            descriptor,
            provisioner,
            statistics: Arc::new(NoopStatisticsSink),
            cluster: None,
        }
    }

    /// The descriptor this fixture was built from.
    #[must_use]
    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Replace the statistics sink.
    ///
    /// Only possible before a cluster is live; afterwards the sink is wired
    /// into every engine and swapping it would require re-provisioning.
    ///
    /// # Errors
    /// `ClusterActive` when a cluster is currently live.
    pub fn set_statistics_sink(&mut self, sink: Arc<dyn StatisticsSink>) -> FixtureResult<()> {
        if self.cluster.is_some() {
            return Err(FixtureError::ClusterActive);
        }
        self.statistics = sink;
        Ok(())
    }

    /// Cheap feasibility check: can this backend address `n` nodes?
    ///
    /// Provisions nothing and has no side effects.
    #[must_use]
    pub fn is_available(&self, n: usize) -> bool {
        self.provisioner.is_available(n)
    }

    /// Handles of the live cluster, empty when none is live.
    #[must_use]
    pub fn handles(&self) -> &[RepositoryHandle] {
        self.cluster.as_deref().unwrap_or(&[])
    }

    /// Provision a cluster of `n` nodes with the default (no-op) customizer.
    ///
    /// # Errors
    /// See [`set_up_cluster_with`](Self::set_up_cluster_with).
    pub async fn set_up_cluster(&mut self, n: usize) -> FixtureResult<&[RepositoryHandle]> {
        self.set_up_cluster_with(n, |_| Ok(())).await
    }

    /// Provision a cluster of `n` nodes, applying `customizer` once per node.
    ///
    /// Per node, in order: engine construction, statistics binding, then the
    /// customizer. Handles are returned in provisioning order and retained
    /// until [`tear_down_cluster`](Self::tear_down_cluster).
    ///
    /// # Errors
    /// `ClusterActive` when a cluster is already live. `Provisioning` when an
    /// engine fails to construct. A customizer failure surfaces unchanged.
    /// On any failure the whole cluster built by this call has been rolled
    /// back and the fixture holds zero handles.
    pub async fn set_up_cluster_with<F>(
        &mut self,
        n: usize,
        customizer: F,
    ) -> FixtureResult<&[RepositoryHandle]>
    where
        F: Fn(&mut RepositoryBuilder) -> FixtureResult<()>,
    {
        if self.cluster.is_some() {
            return Err(FixtureError::ClusterActive);
        }

        let started = Instant::now();
        tracing::info!(backend = %self.descriptor, nodes = n, "provisioning cluster");
        let engines = self.provisioner.set_up(n).await?;

        let mut handles: Vec<RepositoryHandle> = Vec::with_capacity(engines.len());
        let mut remaining = engines.into_iter();
        while let Some(engine) = remaining.next() {
            let node_id = engine.node_id();
            let mut builder = RepositoryBuilder::new(engine);
            builder.engine_mut().extensions_mut().register(
                STATISTICS_SERVICE_KIND,
                Arc::new(StatisticsBinding::new(Arc::clone(&self.statistics))),
                HashMap::new(),
            );

            match customizer(&mut builder) {
                Ok(()) => {
                    self.statistics.record_count("cluster.node.provisioned", 1);
                    handles.push(builder.build());
                }
                Err(err) => {
                    tracing::warn!(
                        backend = %self.descriptor,
                        node_id,
                        error = %err,
                        "customization failed, rolling back cluster"
                    );
                    let mut engines: Vec<Box<dyn EngineInstance>> =
                        handles.into_iter().map(RepositoryHandle::into_engine).collect();
                    engines.push(builder.into_engine());
                    engines.extend(remaining);
                    self.roll_back(engines).await;
                    return Err(err);
                }
            }
        }

        self.statistics
            .record_duration("cluster.set_up", started.elapsed());
        tracing::info!(
            backend = %self.descriptor,
            nodes = handles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cluster provisioned"
        );
        Ok(self.cluster.insert(handles).as_slice())
    }

    /// Tear down the live cluster, best-effort per node.
    ///
    /// Every node with the graceful-shutdown capability is shut down; one
    /// node's failure never stops its siblings. Backend-level resources are
    /// released afterwards in every case. Idempotent: with no live cluster
    /// this is a no-op.
    ///
    /// # Errors
    /// `Shutdown`, aggregating every node and backend failure, surfaced only
    /// after teardown of all of them has been attempted.
    pub async fn tear_down_cluster(&mut self) -> FixtureResult<()> {
        let mut failures = Vec::new();

        if let Some(handles) = self.cluster.take() {
            tracing::info!(
                backend = %self.descriptor,
                nodes = handles.len(),
                "tearing down cluster"
            );
            for mut handle in handles {
                if handle.supports_graceful_shutdown() {
                    if let Err(err) = handle.shutdown().await {
                        tracing::warn!(
                            node_id = handle.node_id(),
                            error = %err,
                            "node shutdown failed, continuing with siblings"
                        );
                        failures.push(format!("node {}: {err}", handle.node_id()));
                    }
                }
            }
        }

        if let Err(err) = self.provisioner.tear_down().await {
            failures.push(format!("backend: {err}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::Shutdown { failures })
        }
    }

    /// Resynchronize repository state across the given nodes.
    ///
    /// Intentionally unsupported: callers must not assume cross-node
    /// consistency was achieved, so this fails instead of silently
    /// succeeding.
    ///
    /// # Errors
    /// Always `Unsupported`, for any input including zero handles.
    pub fn sync_repository_cluster(&self, _nodes: &[RepositoryHandle]) -> FixtureResult<()> {
        Err(FixtureError::unsupported("sync_repository_cluster"))
    }

    async fn roll_back(&mut self, engines: Vec<Box<dyn EngineInstance>>) {
        for mut engine in engines {
            if engine.supports_graceful_shutdown() {
                if let Err(err) = engine.shutdown().await {
                    tracing::warn!(
                        node_id = engine.node_id(),
                        error = %err,
                        "rollback shutdown failed"
                    );
                }
            }
        }
        if let Err(err) = self.provisioner.tear_down().await {
            tracing::warn!(error = %err, "backend teardown during rollback failed");
        }
    }
}

impl fmt::Display for RepositoryFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.descriptor, f)
    }
}

impl fmt::Debug for RepositoryFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFixture")
            .field("descriptor", &self.descriptor)
            .field("live_nodes", &self.handles().len())
            .finish()
    }
}
