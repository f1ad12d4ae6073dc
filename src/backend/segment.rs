//! Segment File Backend
//!
//! Append-only segment stores on disk, one directory per cluster node under
//! the descriptor's base path:
//!
//! ```text
//! <base>/node-0/journal.log
//! <base>/node-0/segments/
//! <base>/node-0/blobs/        (blob-store variant only)
//! <base>/node-1/...
//! ```
//!
//! `max_file_size_mb` and `memory_mapping` are passed through verbatim to the
//! engine. Node directories are test state: teardown always removes them.
//! Legacy tar-layout descriptors provision through this backend unchanged.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::constants::{BLOB_STORE_DIR_NAME, SEGMENT_DATA_DIR_NAME, SEGMENT_JOURNAL_FILE_NAME};
use crate::engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};

use super::descriptor::{BackendDescriptor, BackendKind};
use super::provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};

/// Lay out an empty segment store inside `dir`.
///
/// Shared with the multiplexed overlay, which initializes one store per mount.
pub(crate) async fn init_store_dir(dir: &Path, with_blobs: bool) -> EngineResult<()> {
    tokio::fs::create_dir_all(dir.join(SEGMENT_DATA_DIR_NAME)).await?;
    tokio::fs::write(dir.join(SEGMENT_JOURNAL_FILE_NAME), b"").await?;
    if with_blobs {
        tokio::fs::create_dir_all(dir.join(BLOB_STORE_DIR_NAME)).await?;
    }
    Ok(())
}

// =============================================================================
// SegmentEngine
// =============================================================================

/// One file-backed segment store.
#[derive(Debug)]
pub struct SegmentEngine {
    kind: BackendKind,
    node_id: usize,
    store_dir: PathBuf,
    max_file_size_mb: usize,
    memory_mapping: bool,
    blob_store_dir: Option<PathBuf>,
    extensions: ExtensionRegistry,
    open: bool,
}

impl SegmentEngine {
    fn new(
        kind: BackendKind,
        node_id: usize,
        store_dir: PathBuf,
        max_file_size_mb: usize,
        memory_mapping: bool,
        blob_store_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            kind,
            node_id,
            store_dir,
            max_file_size_mb,
            memory_mapping,
            blob_store_dir,
            extensions: ExtensionRegistry::new(),
            open: true,
        }
    }

    /// Directory holding this node's store.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Maximum segment file size, as configured.
    #[must_use]
    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size_mb
    }

    /// Whether segment files are memory-mapped.
    #[must_use]
    pub fn memory_mapping(&self) -> bool {
        self.memory_mapping
    }

    /// Blob store directory, for the blob-store variant.
    #[must_use]
    pub fn blob_store_dir(&self) -> Option<&Path> {
        self.blob_store_dir.as_deref()
    }

    /// Append one entry to the store's journal.
    ///
    /// # Errors
    /// `Storage` if the engine has been shut down, `Io` on write failure.
    pub async fn append_journal(&self, entry: &str) -> EngineResult<()> {
        if !self.open {
            return Err(EngineError::storage("store is closed"));
        }
        let mut journal = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.store_dir.join(SEGMENT_JOURNAL_FILE_NAME))
            .await?;
        journal.write_all(entry.as_bytes()).await?;
        journal.write_all(b"\n").await?;
        journal.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EngineInstance for SegmentEngine {
    fn kind(&self) -> BackendKind {
        self.kind
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
            self.open = false;
            tracing::debug!(
                node_id = self.node_id,
                store_dir = %self.store_dir.display(),
                "segment store closed"
            );
        }
        Ok(())
    }
}

// =============================================================================
// SegmentProvisioner
// =============================================================================

/// Provisions per-node segment stores under the descriptor's base path.
#[derive(Debug)]
pub struct SegmentProvisioner {
    descriptor: BackendDescriptor,
    created_dirs: Vec<PathBuf>,
}

impl SegmentProvisioner {
    /// Create a provisioner for a segment-family descriptor.
    #[must_use]
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            created_dirs: Vec::new(),
        }
    }

    fn base_path(&self) -> ProvisionResult<&Path> {
        self.descriptor.base_path().ok_or_else(|| {
            ProvisionError::node(0, EngineError::storage("segment descriptor lacks a base path"))
        })
    }
}

#[async_trait]
impl BackendProvisioner for SegmentProvisioner {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision_node(&mut self, node_id: usize) -> ProvisionResult<Box<dyn EngineInstance>> {
        let with_blobs = self.descriptor.kind().uses_blob_store();
        let store_dir = self.base_path()?.join(format!("node-{node_id}"));

        // Recorded before initialization, so a half-laid-out store is still
        // removed when the cluster rolls back.
        self.created_dirs.push(store_dir.clone());
        init_store_dir(&store_dir, with_blobs)
            .await
            .map_err(|err| ProvisionError::node(node_id, err))?;

        let engine = SegmentEngine::new(
            self.descriptor.kind(),
            node_id,
            store_dir.clone(),
            self.descriptor
                .max_file_size_mb()
                .unwrap_or(crate::constants::SEGMENT_FILE_SIZE_MB_DEFAULT),
            self.descriptor.memory_mapping().unwrap_or(false),
            with_blobs.then(|| store_dir.join(BLOB_STORE_DIR_NAME)),
        );
        tracing::debug!(node_id, store_dir = %store_dir.display(), "segment store provisioned");
        Ok(Box::new(engine))
    }

    async fn tear_down(&mut self) -> ProvisionResult<()> {
        let mut failures = Vec::new();
        for dir in self.created_dirs.drain(..) {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::debug!(dir = %dir.display(), "segment store removed"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(base: &Path) -> BackendDescriptor {
        BackendDescriptor::segment(base, 256, 64, false).unwrap()
    }

    #[tokio::test]
    async fn test_provisions_store_layout() {
        let base = TempDir::new().unwrap();
        let mut provisioner = SegmentProvisioner::new(descriptor(base.path()));

        let engines = provisioner.set_up(2).await.unwrap();
        assert_eq!(engines.len(), 2);

        for node_id in 0..2 {
            let node_dir = base.path().join(format!("node-{node_id}"));
            assert!(node_dir.join(SEGMENT_JOURNAL_FILE_NAME).is_file());
            assert!(node_dir.join(SEGMENT_DATA_DIR_NAME).is_dir());
            assert!(!node_dir.join(BLOB_STORE_DIR_NAME).exists());
        }
    }

    #[tokio::test]
    async fn test_failed_init_rolls_back_partial_store() {
        let base = TempDir::new().unwrap();
        // A directory squatting on the journal path makes initialization
        // fail after the segments directory was already created.
        tokio::fs::create_dir_all(
            base.path().join("node-0").join(SEGMENT_JOURNAL_FILE_NAME),
        )
        .await
        .unwrap();

        let mut provisioner = SegmentProvisioner::new(descriptor(base.path()));
        assert!(provisioner.set_up(1).await.is_err());
        assert!(
            !base.path().join("node-0").exists(),
            "rollback must remove the partial store"
        );
    }

    #[tokio::test]
    async fn test_blob_store_variant_creates_blob_dir() {
        let base = TempDir::new().unwrap();
        let descriptor =
            BackendDescriptor::segment_with_blob_store(base.path(), 256, 64, false, 16).unwrap();
        let mut provisioner = SegmentProvisioner::new(descriptor);

        let engines = provisioner.set_up(1).await.unwrap();
        assert_eq!(engines.len(), 1);
        assert!(base.path().join("node-0").join(BLOB_STORE_DIR_NAME).is_dir());
    }

    #[tokio::test]
    async fn test_journal_append_and_close() {
        let base = TempDir::new().unwrap();
        let store_dir = base.path().join("node-0");
        init_store_dir(&store_dir, false).await.unwrap();

        let mut engine = SegmentEngine::new(
            BackendKind::SegmentFile,
            0,
            store_dir.clone(),
            256,
            false,
            None,
        );
        engine.append_journal("head 0").await.unwrap();
        engine.append_journal("head 1").await.unwrap();

        let journal = tokio::fs::read_to_string(store_dir.join(SEGMENT_JOURNAL_FILE_NAME))
            .await
            .unwrap();
        assert_eq!(journal, "head 0\nhead 1\n");

        engine.shutdown().await.unwrap();
        assert!(engine.append_journal("late").await.is_err());
    }

    #[tokio::test]
    async fn test_tear_down_removes_dirs_and_is_idempotent() {
        let base = TempDir::new().unwrap();
        let mut provisioner = SegmentProvisioner::new(descriptor(base.path()));

        let mut engines = provisioner.set_up(2).await.unwrap();
        for engine in &mut engines {
            engine.shutdown().await.unwrap();
        }
        drop(engines);

        provisioner.tear_down().await.unwrap();
        assert!(!base.path().join("node-0").exists());
        assert!(!base.path().join("node-1").exists());

        provisioner.tear_down().await.unwrap();
    }

    #[tokio::test]
    async fn test_config_pass_through() {
        let base = TempDir::new().unwrap();
        let descriptor = BackendDescriptor::segment(base.path(), 128, 64, true).unwrap();
        let mut provisioner = SegmentProvisioner::new(descriptor);

        let engines = provisioner.set_up(1).await.unwrap();
        // The trait surface carries no file config; check via descriptor.
        assert_eq!(provisioner.descriptor().max_file_size_mb(), Some(128));
        assert_eq!(provisioner.descriptor().memory_mapping(), Some(true));
        assert_eq!(engines[0].kind(), BackendKind::SegmentFile);
    }
}
