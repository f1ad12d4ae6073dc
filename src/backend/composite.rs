//! Multiplexed Overlay Backend
//!
//! Several independently configured segment sub-stores unified behind one
//! mount-resolving facade. Per cluster node this provisioner builds exactly
//! `mount_count` sub-stores plus one [`MountResolver`] composing them, and the
//! whole unit is torn down together:
//!
//! ```text
//! <base>/node-0/mnt-0/   ← root mount, resolves "/"
//! <base>/node-0/mnt-1/   ← resolves "/mnt-1"
//! <base>/node-0/mnt-2/   ← resolves "/mnt-2"
//! ...
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::constants::MOUNT_COUNT_MIN;
use crate::engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};

use super::descriptor::{BackendDescriptor, BackendKind};
use super::provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};
use super::segment::init_store_dir;

// =============================================================================
// Mounts
// =============================================================================

/// One mounted sub-store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Mount name, e.g. `mnt-1`
    pub name: String,
    /// Content path this mount covers; the root mount covers `/`
    pub mount_path: String,
    /// Directory holding the sub-store
    pub store_dir: PathBuf,
}

/// Resolves content paths to mounted sub-stores by longest matching prefix.
///
/// The root mount covers `/`, so every path resolves.
#[derive(Debug, Clone)]
pub struct MountResolver {
    mounts: Vec<Mount>,
}

impl MountResolver {
    fn new(mounts: Vec<Mount>) -> Self {
        assert!(
            mounts.len() >= MOUNT_COUNT_MIN,
            "resolver needs at least the root mount"
        );
        assert_eq!(mounts[0].mount_path, "/", "mount 0 must be the root mount");
        Self { mounts }
    }

    /// All mounts, root first.
    #[must_use]
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Number of mounted sub-stores.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    /// Resolve a content path to its mount.
    #[must_use]
    pub fn resolve(&self, content_path: &str) -> &Mount {
        self.mounts
            .iter()
            .filter(|mount| {
                content_path == mount.mount_path
                    || mount.mount_path == "/"
                    || content_path.starts_with(&format!("{}/", mount.mount_path))
            })
            .max_by_key(|mount| mount.mount_path.len())
            .expect("root mount matches every path")
    }
}

// =============================================================================
// CompositeEngine
// =============================================================================

/// One node of the multiplexed overlay: all sub-stores plus their resolver.
#[derive(Debug)]
pub struct CompositeEngine {
    node_id: usize,
    resolver: MountResolver,
    extensions: ExtensionRegistry,
    open: bool,
}

impl CompositeEngine {
    fn new(node_id: usize, resolver: MountResolver) -> Self {
        Self {
            node_id,
            resolver,
            extensions: ExtensionRegistry::new(),
            open: true,
        }
    }

    /// The mount resolver composing this node's sub-stores.
    #[must_use]
    pub fn resolver(&self) -> &MountResolver {
        &self.resolver
    }

    /// Number of sub-stores in this node.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.resolver.mount_count()
    }
}

#[async_trait]
impl EngineInstance for CompositeEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::MultiplexedOverlay
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
            // All mounts close as one unit.
            self.open = false;
            tracing::debug!(
                node_id = self.node_id,
                mounts = self.resolver.mount_count(),
                "composite store closed"
            );
        }
        Ok(())
    }
}

// =============================================================================
// CompositeProvisioner
// =============================================================================

/// Provisions multiplexed overlay nodes.
#[derive(Debug)]
pub struct CompositeProvisioner {
    descriptor: BackendDescriptor,
    created_dirs: Vec<PathBuf>,
}

impl CompositeProvisioner {
    /// Create a provisioner for a multiplexed-overlay descriptor.
    #[must_use]
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            created_dirs: Vec::new(),
        }
    }

    fn base_path(&self) -> ProvisionResult<&Path> {
        self.descriptor.base_path().ok_or_else(|| {
            ProvisionError::node(
                0,
                EngineError::storage("multiplexed descriptor lacks a base path"),
            )
        })
    }

    fn mount_count(&self) -> usize {
        self.descriptor.mount_count().unwrap_or(MOUNT_COUNT_MIN)
    }
}

#[async_trait]
impl BackendProvisioner for CompositeProvisioner {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision_node(&mut self, node_id: usize) -> ProvisionResult<Box<dyn EngineInstance>> {
        let node_dir = self.base_path()?.join(format!("node-{node_id}"));
        let mount_count = self.mount_count();

        // Recorded before the mounts are laid out, so a failure on a later
        // mount still removes the ones already on disk when rolling back.
        self.created_dirs.push(node_dir.clone());
        let mut mounts = Vec::with_capacity(mount_count);
        for mount_id in 0..mount_count {
            let name = format!("mnt-{mount_id}");
            let store_dir = node_dir.join(&name);
            init_store_dir(&store_dir, false)
                .await
                .map_err(|err| ProvisionError::node(node_id, err))?;
            let mount_path = if mount_id == 0 {
                "/".to_string()
            } else {
                format!("/{name}")
            };
            mounts.push(Mount {
                name,
                mount_path,
                store_dir,
            });
        }

        tracing::debug!(
            node_id,
            mounts = mount_count,
            node_dir = %node_dir.display(),
            "composite store provisioned"
        );
        Ok(Box::new(CompositeEngine::new(
            node_id,
            MountResolver::new(mounts),
        )))
    }

    async fn tear_down(&mut self) -> ProvisionResult<()> {
        let mut failures = Vec::new();
        for dir in self.created_dirs.drain(..) {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::debug!(dir = %dir.display(), "composite store removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => failures.push(format!("{}: {err}", dir.display())),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::teardown(failures.join("; ")))
        }
    }
}
