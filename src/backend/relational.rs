//! Relational Backend
//!
//! Document-style repository state in a relational store behind a
//! `postgres://` URI/credentials/table-prefix configuration. Each cluster
//! node holds its own connection pool; all nodes share the prefix-qualified
//! tables. Compiled behind the `relational` cargo feature.
//!
//! The schema is created on first connect with `CREATE TABLE IF NOT EXISTS`.
//! When `drop_store_after_test` is set, teardown drops the prefix-qualified
//! tables; otherwise they are left for inspection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection};

use crate::constants::{
    BLOB_STORE_DIR_NAME, RELATIONAL_POOL_CONNECTIONS_COUNT_MAX, RELATIONAL_TABLE_NAMES,
    RELATIONAL_TABLE_PREFIX_DEFAULT,
};
use crate::engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};

use super::descriptor::{BackendDescriptor, BackendKind, Endpoint};
use super::provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};

fn qualified_table(prefix: &str, table: &str) -> String {
    format!("{prefix}_{table}")
}

// =============================================================================
// RelationalEngine
// =============================================================================

/// One relational node: a pool against the shared prefix-qualified tables.
#[derive(Debug)]
pub struct RelationalEngine {
    kind: BackendKind,
    node_id: usize,
    pool: PgPool,
    table_prefix: String,
    blob_store_dir: Option<PathBuf>,
    extensions: ExtensionRegistry,
}

impl RelationalEngine {
    /// Prefix qualifying this store's tables.
    #[must_use]
    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// The node's connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Blob store directory, for the blob-store variant.
    #[must_use]
    pub fn blob_store_dir(&self) -> Option<&Path> {
        self.blob_store_dir.as_deref()
    }
}

#[async_trait]
impl EngineInstance for RelationalEngine {
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
        self.pool.close().await;
        tracing::debug!(node_id = self.node_id, "relational node closed");
        Ok(())
    }
}

// =============================================================================
// RelationalProvisioner
// =============================================================================

/// Provisions relational nodes against one shared set of tables.
#[derive(Debug)]
pub struct RelationalProvisioner {
    descriptor: BackendDescriptor,
    // Retained for teardown. Node pools close during engine shutdown, so the
    // drop statements run over a dedicated connection opened from these.
    admin: Option<PgConnectOptions>,
    created_dirs: Vec<PathBuf>,
}

impl RelationalProvisioner {
    /// Create a provisioner for a relational-family descriptor.
    #[must_use]
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            admin: None,
            created_dirs: Vec::new(),
        }
    }

    fn table_prefix(&self) -> &str {
        self.descriptor
            .table_prefix()
            .unwrap_or(RELATIONAL_TABLE_PREFIX_DEFAULT)
    }

    fn connect_options(&self, node_id: usize) -> ProvisionResult<PgConnectOptions> {
        let uri = match self.descriptor.endpoint() {
            Some(Endpoint::Uri { uri }) => uri,
            _ => {
                return Err(ProvisionError::node(
                    node_id,
                    EngineError::connection("relational descriptor lacks a URI endpoint"),
                ))
            }
        };
        let mut options: PgConnectOptions = uri.parse().map_err(|err: sqlx::Error| {
            ProvisionError::node(node_id, EngineError::connection(err.to_string()))
        })?;
        if let Some(credentials) = self.descriptor.credentials() {
            options = options
                .username(&credentials.user)
                .password(&credentials.password);
        }
        Ok(options)
    }

    async fn initialize_schema(&self, pool: &PgPool, node_id: usize) -> ProvisionResult<()> {
        for table in RELATIONAL_TABLE_NAMES {
            let statement = format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, modified BIGINT, data BYTEA)",
                qualified_table(self.table_prefix(), table)
            );
            sqlx::query(&statement).execute(pool).await.map_err(|err| {
                ProvisionError::node(node_id, EngineError::storage(err.to_string()))
            })?;
        }
        Ok(())
    }

    async fn blob_store_dir(&mut self, node_id: usize) -> ProvisionResult<Option<PathBuf>> {
        if !self.descriptor.kind().uses_blob_store() {
            return Ok(None);
        }
        let base = self.descriptor.base_path().ok_or_else(|| {
            ProvisionError::node(
                node_id,
                EngineError::storage("blob-store descriptor lacks a base path"),
            )
        })?;
        let dir = base
            .join(BLOB_STORE_DIR_NAME)
            .join(format!("node-{node_id}"));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| ProvisionError::node(node_id, EngineError::from(err)))?;
        self.created_dirs.push(dir.clone());
        Ok(Some(dir))
    }
}

#[async_trait]
impl BackendProvisioner for RelationalProvisioner {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision_node(&mut self, node_id: usize) -> ProvisionResult<Box<dyn EngineInstance>> {
        let options = self.connect_options(node_id)?;
        let pool = PgPoolOptions::new()
            .max_connections(RELATIONAL_POOL_CONNECTIONS_COUNT_MAX)
            .connect_with(options.clone())
            .await
            .map_err(|err| {
                ProvisionError::node(node_id, EngineError::connection(err.to_string()))
            })?;

        // Every node runs IF NOT EXISTS, so shared tables appear exactly once.
        self.initialize_schema(&pool, node_id).await?;

        if self.admin.is_none() {
            self.admin = Some(options);
        }
        let blob_store_dir = self.blob_store_dir(node_id).await?;

        tracing::debug!(node_id, prefix = self.table_prefix(), "relational node provisioned");
        Ok(Box::new(RelationalEngine {
            kind: self.descriptor.kind(),
            node_id,
            pool,
            table_prefix: self.table_prefix().to_string(),
            blob_store_dir,
            extensions: ExtensionRegistry::new(),
        }))
    }

    async fn tear_down(&mut self) -> ProvisionResult<()> {
        let mut failures = Vec::new();

        if let Some(options) = self.admin.take() {
            if self.descriptor.drop_store_after_test() {
                match options.connect().await {
                    Ok(mut conn) => {
                        let mut all_dropped = true;
                        for table in RELATIONAL_TABLE_NAMES {
                            let statement = format!(
                                "DROP TABLE IF EXISTS {}",
                                qualified_table(self.table_prefix(), table)
                            );
                            if let Err(err) = sqlx::query(&statement).execute(&mut conn).await {
                                failures.push(format!("drop {table}: {err}"));
                                all_dropped = false;
                            }
                        }
                        if all_dropped {
                            tracing::info!(
                                prefix = self.table_prefix(),
                                "relational tables dropped"
                            );
                        }
                        if let Err(err) = conn.close().await {
                            failures.push(format!("close admin connection: {err}"));
                        }
                    }
                    Err(err) => failures.push(format!("admin connect: {err}")),
                }
            } else {
                tracing::info!(
                    prefix = self.table_prefix(),
                    "relational tables left for inspection"
                );
            }
        }

        for dir in self.created_dirs.drain(..) {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
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
