//! Backend Descriptors
//!
//! Immutable, validated configuration for one backend kind. Each constructor
//! checks the fields its kind requires and fails fast with
//! [`FixtureError::InvalidConfiguration`] instead of producing a partially
//! built descriptor. Constructors have no side effects; no resource is
//! touched until a provisioner runs.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    BLOB_CACHE_SIZE_MB_DEFAULT, CACHE_SIZE_BYTES_DEFAULT, MOUNT_COUNT_MAX, MOUNT_COUNT_MIN,
    SEGMENT_CACHE_SIZE_MB_DEFAULT, SEGMENT_FILE_SIZE_MB_DEFAULT,
};
use crate::error::{FixtureError, FixtureResult};

// =============================================================================
// BackendKind
// =============================================================================

/// The storage backend kinds a fixture can provision.
///
/// The kind determines which optional descriptor fields are meaningful; a
/// provisioner rejects a descriptor missing required fields for its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// In-memory node store, no persistence
    Memory,
    /// Networked document store
    Document,
    /// Networked document store with an external file blob store
    DocumentWithBlobs,
    /// Relational store behind a JDBC-style URI
    Relational,
    /// Relational store with an external file blob store
    RelationalWithBlobs,
    /// Append-only segment file store
    SegmentFile,
    /// Segment file store with an external file blob store
    SegmentFileWithBlobs,
    /// Several segment sub-stores unified behind one mount resolver
    MultiplexedOverlay,
}

impl BackendKind {
    /// Stable lowercase name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Document => "document",
            Self::DocumentWithBlobs => "document-with-blobs",
            Self::Relational => "relational",
            Self::RelationalWithBlobs => "relational-with-blobs",
            Self::SegmentFile => "segment-file",
            Self::SegmentFileWithBlobs => "segment-file-with-blobs",
            Self::MultiplexedOverlay => "multiplexed-overlay",
        }
    }

    /// Whether this kind carries an external file blob store.
    #[must_use]
    pub fn uses_blob_store(&self) -> bool {
        matches!(
            self,
            Self::DocumentWithBlobs | Self::RelationalWithBlobs | Self::SegmentFileWithBlobs
        )
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Endpoint & Credentials
// =============================================================================

/// How a networked backend is reached: split host/port/database or one URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    /// Host, port, and database name
    HostPort {
        /// Server hostname
        host: String,
        /// Server port
        port: u16,
        /// Database name
        database: String,
    },
    /// Single connection URI
    Uri {
        /// Full connection URI, scheme included
        uri: String,
    },
}

impl Endpoint {
    /// The database name, when the endpoint carries one explicitly.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::HostPort { database, .. } => Some(database),
            Self::Uri { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostPort {
                host,
                port,
                database,
            } => write!(f, "{host}:{port}/{database}"),
            Self::Uri { uri } => f.write_str(uri),
        }
    }
}

/// Credentials for a backend that authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login user
    pub user: String,
    /// Login password; never serialized into config snapshots
    #[serde(skip_serializing, default)]
    pub password: String,
}

// =============================================================================
// BackendDescriptor
// =============================================================================

/// A fully specified, validated backend configuration.
///
/// Immutable once built; all access goes through getters. `Display` renders
/// the backend name for logs. Serializes for config snapshots (passwords are
/// omitted) and deserializes through the per-kind constructors, so a loaded
/// descriptor passes exactly the validation a hand-built one does.
#[derive(Debug, Clone, Serialize)]
pub struct BackendDescriptor {
    kind: BackendKind,
    name: String,
    endpoint: Option<Endpoint>,
    credentials: Option<Credentials>,
    cache_size_bytes: usize,
    max_file_size_mb: Option<usize>,
    memory_mapping: Option<bool>,
    mount_count: Option<usize>,
    blob_cache_mb: Option<usize>,
    base_path: Option<PathBuf>,
    table_prefix: Option<String>,
    drop_store_after_test: bool,
}

impl BackendDescriptor {
    // -------------------------------------------------------------------------
    // Constructors, one per backend kind
    // -------------------------------------------------------------------------

    /// In-memory backend with the given node-store cache size.
    ///
    /// # Errors
    /// `InvalidConfiguration` if `cache_size_bytes` is zero.
    pub fn memory(cache_size_bytes: usize) -> FixtureResult<Self> {
        require(cache_size_bytes > 0, "cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Memory".to_string(),
            cache_size_bytes,
            ..Self::bare(BackendKind::Memory)
        })
    }

    /// Networked document store reached by host, port, and database.
    ///
    /// # Errors
    /// `InvalidConfiguration` if host or database is empty, or port is zero.
    pub fn document(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
    ) -> FixtureResult<Self> {
        let endpoint = host_port_endpoint(host.into(), port, database.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Document".to_string(),
            endpoint: Some(endpoint),
            cache_size_bytes,
            drop_store_after_test,
            ..Self::bare(BackendKind::Document)
        })
    }

    /// Networked document store reached by a single connection URI.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the URI is empty or not a document-store URI.
    pub fn document_uri(
        uri: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
    ) -> FixtureResult<Self> {
        let endpoint = document_uri_endpoint(uri.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Document".to_string(),
            endpoint: Some(endpoint),
            cache_size_bytes,
            drop_store_after_test,
            ..Self::bare(BackendKind::Document)
        })
    }

    /// Document store plus an external file blob store under `base_path`.
    ///
    /// # Errors
    /// `InvalidConfiguration` on a bad endpoint, empty base path, or zero
    /// blob cache.
    pub fn document_with_blob_store(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
        base_path: impl AsRef<Path>,
        blob_cache_mb: usize,
    ) -> FixtureResult<Self> {
        let endpoint = host_port_endpoint(host.into(), port, database.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        let base_path = required_base_path(base_path)?;
        require(blob_cache_mb > 0, "blob cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Document-Blobs".to_string(),
            endpoint: Some(endpoint),
            cache_size_bytes,
            blob_cache_mb: Some(blob_cache_mb),
            base_path: Some(base_path),
            drop_store_after_test,
            ..Self::bare(BackendKind::DocumentWithBlobs)
        })
    }

    /// URI variant of [`document_with_blob_store`](Self::document_with_blob_store).
    ///
    /// # Errors
    /// `InvalidConfiguration` on a bad URI, empty base path, or zero blob cache.
    pub fn document_uri_with_blob_store(
        uri: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
        base_path: impl AsRef<Path>,
        blob_cache_mb: usize,
    ) -> FixtureResult<Self> {
        let endpoint = document_uri_endpoint(uri.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        let base_path = required_base_path(base_path)?;
        require(blob_cache_mb > 0, "blob cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Document-Blobs".to_string(),
            endpoint: Some(endpoint),
            cache_size_bytes,
            blob_cache_mb: Some(blob_cache_mb),
            base_path: Some(base_path),
            drop_store_after_test,
            ..Self::bare(BackendKind::DocumentWithBlobs)
        })
    }

    /// Relational store behind a JDBC-style URI with credentials and a table
    /// prefix.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the URI or user is empty.
    pub fn relational(
        uri: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        table_prefix: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
    ) -> FixtureResult<Self> {
        let (endpoint, credentials, table_prefix) =
            relational_fields(uri.into(), user.into(), password.into(), table_prefix.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        Ok(Self {
            name: "Quarry-RDB".to_string(),
            endpoint: Some(endpoint),
            credentials: Some(credentials),
            cache_size_bytes,
            table_prefix,
            drop_store_after_test,
            ..Self::bare(BackendKind::Relational)
        })
    }

    /// Relational store plus an external file blob store under `base_path`.
    ///
    /// # Errors
    /// `InvalidConfiguration` on bad relational fields, empty base path, or
    /// zero blob cache.
    #[allow(clippy::too_many_arguments)]
    pub fn relational_with_blob_store(
        uri: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        table_prefix: impl Into<String>,
        drop_store_after_test: bool,
        cache_size_bytes: usize,
        base_path: impl AsRef<Path>,
        blob_cache_mb: usize,
    ) -> FixtureResult<Self> {
        let (endpoint, credentials, table_prefix) =
            relational_fields(uri.into(), user.into(), password.into(), table_prefix.into())?;
        require(cache_size_bytes > 0, "cache size must be positive")?;
        let base_path = required_base_path(base_path)?;
        require(blob_cache_mb > 0, "blob cache size must be positive")?;
        Ok(Self {
            name: "Quarry-RDB-Blobs".to_string(),
            endpoint: Some(endpoint),
            credentials: Some(credentials),
            cache_size_bytes,
            blob_cache_mb: Some(blob_cache_mb),
            base_path: Some(base_path),
            table_prefix,
            drop_store_after_test,
            ..Self::bare(BackendKind::RelationalWithBlobs)
        })
    }

    /// Segment file store under `base_path`.
    ///
    /// `max_file_size_mb` and `memory_mapping` are passed through verbatim to
    /// the file-backed engine.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the base path is empty or a size is zero.
    pub fn segment(
        base_path: impl AsRef<Path>,
        max_file_size_mb: usize,
        cache_size_mb: usize,
        memory_mapping: bool,
    ) -> FixtureResult<Self> {
        let base_path = required_base_path(base_path)?;
        require(max_file_size_mb > 0, "max file size must be positive")?;
        require(cache_size_mb > 0, "cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Segment".to_string(),
            cache_size_bytes: cache_size_mb * 1024 * 1024,
            max_file_size_mb: Some(max_file_size_mb),
            memory_mapping: Some(memory_mapping),
            base_path: Some(base_path),
            ..Self::bare(BackendKind::SegmentFile)
        })
    }

    /// Segment file store plus an external file blob store.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the base path is empty or a size is zero.
    pub fn segment_with_blob_store(
        base_path: impl AsRef<Path>,
        max_file_size_mb: usize,
        cache_size_mb: usize,
        memory_mapping: bool,
        blob_cache_mb: usize,
    ) -> FixtureResult<Self> {
        let base_path = required_base_path(base_path)?;
        require(max_file_size_mb > 0, "max file size must be positive")?;
        require(cache_size_mb > 0, "cache size must be positive")?;
        require(blob_cache_mb > 0, "blob cache size must be positive")?;
        Ok(Self {
            name: "Quarry-Segment-Blobs".to_string(),
            cache_size_bytes: cache_size_mb * 1024 * 1024,
            max_file_size_mb: Some(max_file_size_mb),
            memory_mapping: Some(memory_mapping),
            blob_cache_mb: Some(blob_cache_mb),
            base_path: Some(base_path),
            ..Self::bare(BackendKind::SegmentFileWithBlobs)
        })
    }

    /// Legacy tar-layout segment store, retained for compatibility.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the base path is empty or a size is zero.
    #[deprecated(note = "use `segment`; the tar layout is retained for compatibility only")]
    pub fn legacy_tar(
        base_path: impl AsRef<Path>,
        max_file_size_mb: usize,
        cache_size_mb: usize,
        memory_mapping: bool,
    ) -> FixtureResult<Self> {
        let mut descriptor = Self::segment(base_path, max_file_size_mb, cache_size_mb, memory_mapping)?;
        descriptor.name = "Quarry-Tar".to_string();
        Ok(descriptor)
    }

    /// Legacy tar-layout segment store with a blob store, retained for
    /// compatibility.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the base path is empty or a size is zero.
    #[deprecated(
        note = "use `segment_with_blob_store`; the tar layout is retained for compatibility only"
    )]
    pub fn legacy_tar_with_blob_store(
        base_path: impl AsRef<Path>,
        max_file_size_mb: usize,
        cache_size_mb: usize,
        memory_mapping: bool,
        blob_cache_mb: usize,
    ) -> FixtureResult<Self> {
        let mut descriptor = Self::segment_with_blob_store(
            base_path,
            max_file_size_mb,
            cache_size_mb,
            memory_mapping,
            blob_cache_mb,
        )?;
        descriptor.name = "Quarry-Tar-Blobs".to_string();
        Ok(descriptor)
    }

    /// Multiplexed overlay of `mount_count` segment sub-stores behind one
    /// mount resolver.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the base path is empty, a size is zero, or
    /// the mount count is outside its limits.
    pub fn multiplexed(
        base_path: impl AsRef<Path>,
        max_file_size_mb: usize,
        cache_size_mb: usize,
        memory_mapping: bool,
        mount_count: usize,
    ) -> FixtureResult<Self> {
        let base_path = required_base_path(base_path)?;
        require(max_file_size_mb > 0, "max file size must be positive")?;
        require(cache_size_mb > 0, "cache size must be positive")?;
        if !(MOUNT_COUNT_MIN..=MOUNT_COUNT_MAX).contains(&mount_count) {
            return Err(FixtureError::invalid_configuration(format!(
                "mount count {mount_count} outside [{MOUNT_COUNT_MIN}, {MOUNT_COUNT_MAX}]"
            )));
        }
        Ok(Self {
            name: "Quarry-Multiplexed".to_string(),
            cache_size_bytes: cache_size_mb * 1024 * 1024,
            max_file_size_mb: Some(max_file_size_mb),
            memory_mapping: Some(memory_mapping),
            mount_count: Some(mount_count),
            base_path: Some(base_path),
            ..Self::bare(BackendKind::MultiplexedOverlay)
        })
    }

    fn bare(kind: BackendKind) -> Self {
        Self {
            kind,
            name: String::new(),
            endpoint: None,
            credentials: None,
            cache_size_bytes: 0,
            max_file_size_mb: None,
            memory_mapping: None,
            mount_count: None,
            blob_cache_mb: None,
            base_path: None,
            table_prefix: None,
            drop_store_after_test: false,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The backend kind.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Display name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection endpoint, for networked kinds.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Credentials, for authenticating kinds.
    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Node-store cache size in bytes.
    #[must_use]
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_size_bytes
    }

    /// Maximum segment file size in MB, for file-backed kinds.
    #[must_use]
    pub fn max_file_size_mb(&self) -> Option<usize> {
        self.max_file_size_mb
    }

    /// Memory-mapping flag, for file-backed kinds.
    #[must_use]
    pub fn memory_mapping(&self) -> Option<bool> {
        self.memory_mapping
    }

    /// Mount count, for the multiplexed overlay.
    #[must_use]
    pub fn mount_count(&self) -> Option<usize> {
        self.mount_count
    }

    /// Blob-store cache size in MB, for blob-store kinds.
    #[must_use]
    pub fn blob_cache_mb(&self) -> Option<usize> {
        self.blob_cache_mb
    }

    /// Base directory for file-resident state.
    #[must_use]
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Table prefix, for relational kinds.
    #[must_use]
    pub fn table_prefix(&self) -> Option<&str> {
        self.table_prefix.as_deref()
    }

    /// Whether teardown purges server-side state.
    #[must_use]
    pub fn drop_store_after_test(&self) -> bool {
        self.drop_store_after_test
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn require(condition: bool, message: &str) -> FixtureResult<()> {
    if condition {
        Ok(())
    } else {
        Err(FixtureError::invalid_configuration(message))
    }
}

fn host_port_endpoint(host: String, port: u16, database: String) -> FixtureResult<Endpoint> {
    require(!host.is_empty(), "host must not be empty")?;
    require(port != 0, "port must not be zero")?;
    require(!database.is_empty(), "database must not be empty")?;
    Ok(Endpoint::HostPort {
        host,
        port,
        database,
    })
}

fn document_uri_endpoint(uri: String) -> FixtureResult<Endpoint> {
    require(!uri.is_empty(), "connection URI must not be empty")?;
    require(
        uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://"),
        "document store URI must use a mongodb scheme",
    )?;
    Ok(Endpoint::Uri { uri })
}

fn relational_fields(
    uri: String,
    user: String,
    password: String,
    table_prefix: String,
) -> FixtureResult<(Endpoint, Credentials, Option<String>)> {
    require(!uri.is_empty(), "connection URI must not be empty")?;
    require(uri.contains("://"), "connection URI must carry a scheme")?;
    require(!user.is_empty(), "user must not be empty")?;
    let table_prefix = if table_prefix.is_empty() {
        None
    } else {
        Some(table_prefix)
    };
    Ok((Endpoint::Uri { uri }, Credentials { user, password }, table_prefix))
}

fn required_base_path(base_path: impl AsRef<Path>) -> FixtureResult<PathBuf> {
    let base_path = base_path.as_ref();
    require(
        !base_path.as_os_str().is_empty(),
        "base path must not be empty",
    )?;
    Ok(base_path.to_path_buf())
}

// =============================================================================
// Loading
// =============================================================================

/// Wire shape for loading a descriptor from configuration.
///
/// Loaded values route through the kind's constructor; omitted sizes take
/// the crate defaults.
#[derive(Deserialize)]
struct RawDescriptor {
    kind: BackendKind,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    endpoint: Option<Endpoint>,
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default)]
    cache_size_bytes: Option<usize>,
    #[serde(default)]
    max_file_size_mb: Option<usize>,
    #[serde(default)]
    memory_mapping: Option<bool>,
    #[serde(default)]
    mount_count: Option<usize>,
    #[serde(default)]
    blob_cache_mb: Option<usize>,
    #[serde(default)]
    base_path: Option<PathBuf>,
    #[serde(default)]
    table_prefix: Option<String>,
    #[serde(default)]
    drop_store_after_test: bool,
}

impl RawDescriptor {
    fn require_base_path(&self) -> FixtureResult<&Path> {
        self.base_path.as_deref().ok_or_else(|| {
            FixtureError::invalid_configuration("base_path is required for this kind")
        })
    }

    fn require_endpoint(&self) -> FixtureResult<&Endpoint> {
        self.endpoint.as_ref().ok_or_else(|| {
            FixtureError::invalid_configuration("endpoint is required for this kind")
        })
    }

    fn into_descriptor(self) -> FixtureResult<BackendDescriptor> {
        let cache_bytes = self.cache_size_bytes.unwrap_or(CACHE_SIZE_BYTES_DEFAULT);
        let cache_mb = self
            .cache_size_bytes
            .map_or(SEGMENT_CACHE_SIZE_MB_DEFAULT, |bytes| bytes / (1024 * 1024));
        let file_mb = self.max_file_size_mb.unwrap_or(SEGMENT_FILE_SIZE_MB_DEFAULT);
        let mapping = self.memory_mapping.unwrap_or(false);
        let blob_mb = self.blob_cache_mb.unwrap_or(BLOB_CACHE_SIZE_MB_DEFAULT);
        let drop_after = self.drop_store_after_test;

        let mut descriptor = match self.kind {
            BackendKind::Memory => BackendDescriptor::memory(cache_bytes)?,
            BackendKind::Document | BackendKind::DocumentWithBlobs => {
                let with_blobs = self.kind.uses_blob_store();
                match self.require_endpoint()? {
                    Endpoint::HostPort {
                        host,
                        port,
                        database,
                    } => {
                        if with_blobs {
                            BackendDescriptor::document_with_blob_store(
                                host.clone(),
                                *port,
                                database.clone(),
                                drop_after,
                                cache_bytes,
                                self.require_base_path()?,
                                blob_mb,
                            )?
                        } else {
                            BackendDescriptor::document(
                                host.clone(),
                                *port,
                                database.clone(),
                                drop_after,
                                cache_bytes,
                            )?
                        }
                    }
                    Endpoint::Uri { uri } => {
                        if with_blobs {
                            BackendDescriptor::document_uri_with_blob_store(
                                uri.clone(),
                                drop_after,
                                cache_bytes,
                                self.require_base_path()?,
                                blob_mb,
                            )?
                        } else {
                            BackendDescriptor::document_uri(uri.clone(), drop_after, cache_bytes)?
                        }
                    }
                }
            }
            BackendKind::Relational | BackendKind::RelationalWithBlobs => {
                let uri = match self.require_endpoint()? {
                    Endpoint::Uri { uri } => uri.clone(),
                    Endpoint::HostPort { .. } => {
                        return Err(FixtureError::invalid_configuration(
                            "relational endpoint must be a connection URI",
                        ))
                    }
                };
                let credentials = self.credentials.as_ref().ok_or_else(|| {
                    FixtureError::invalid_configuration(
                        "credentials are required for relational kinds",
                    )
                })?;
                let prefix = self.table_prefix.clone().unwrap_or_default();
                if self.kind.uses_blob_store() {
                    BackendDescriptor::relational_with_blob_store(
                        uri,
                        credentials.user.clone(),
                        credentials.password.clone(),
                        prefix,
                        drop_after,
                        cache_bytes,
                        self.require_base_path()?,
                        blob_mb,
                    )?
                } else {
                    BackendDescriptor::relational(
                        uri,
                        credentials.user.clone(),
                        credentials.password.clone(),
                        prefix,
                        drop_after,
                        cache_bytes,
                    )?
                }
            }
            BackendKind::SegmentFile => {
                BackendDescriptor::segment(self.require_base_path()?, file_mb, cache_mb, mapping)?
            }
            BackendKind::SegmentFileWithBlobs => BackendDescriptor::segment_with_blob_store(
                self.require_base_path()?,
                file_mb,
                cache_mb,
                mapping,
                blob_mb,
            )?,
            BackendKind::MultiplexedOverlay => {
                let mounts = self.mount_count.ok_or_else(|| {
                    FixtureError::invalid_configuration(
                        "mount_count is required for the multiplexed overlay",
                    )
                })?;
                BackendDescriptor::multiplexed(
                    self.require_base_path()?,
                    file_mb,
                    cache_mb,
                    mapping,
                    mounts,
                )?
            }
        };

        // Snapshots carry the display name; keep it so round-trips preserve
        // legacy names.
        if let Some(name) = self.name {
            if !name.is_empty() {
                descriptor.name = name;
            }
        }
        Ok(descriptor)
    }
}

impl<'de> Deserialize<'de> for BackendDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawDescriptor::deserialize(deserializer)?;
        raw.into_descriptor().map_err(serde::de::Error::custom)
    }
}
