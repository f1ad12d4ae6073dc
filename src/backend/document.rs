//! Document Store Backend
//!
//! Networked document store reached over MongoDB wire protocol. All cluster
//! nodes share one server-side database; each node holds its own client.
//! Compiled behind the `document` cargo feature.
//!
//! Construction verifies the endpoint with a ping so an unreachable server
//! fails the provisioning attempt terminally; connection pooling and retry
//! stay the driver's concern. When `drop_store_after_test` is set, teardown
//! drops the database, otherwise server-side state is left for inspection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;

use crate::constants::{BLOB_STORE_DIR_NAME, DOCUMENT_DATABASE_NAME_DEFAULT};
use crate::engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};

use super::descriptor::{BackendDescriptor, BackendKind, Endpoint};
use super::provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};

// =============================================================================
// DocumentEngine
// =============================================================================

/// One document-store node: a client against the shared database.
#[derive(Debug)]
pub struct DocumentEngine {
    kind: BackendKind,
    node_id: usize,
    client: Client,
    database: String,
    blob_store_dir: Option<PathBuf>,
    extensions: ExtensionRegistry,
}

impl DocumentEngine {
    /// Name of the shared server-side database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The node's client handle.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Blob store directory, for the blob-store variant.
    #[must_use]
    pub fn blob_store_dir(&self) -> Option<&Path> {
        self.blob_store_dir.as_deref()
    }
}

#[async_trait]
impl EngineInstance for DocumentEngine {
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
        // The driver releases its connections when the last clone drops.
        tracing::debug!(node_id = self.node_id, database = %self.database, "document node closed");
        Ok(())
    }
}

// =============================================================================
// DocumentProvisioner
// =============================================================================

/// Provisions document-store nodes against one shared database.
#[derive(Debug)]
pub struct DocumentProvisioner {
    descriptor: BackendDescriptor,
    // Retained for teardown: drops the database when configured to.
    admin: Option<(Client, String)>,
    created_dirs: Vec<PathBuf>,
}

impl DocumentProvisioner {
    /// Create a provisioner for a document-family descriptor.
    #[must_use]
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            admin: None,
            created_dirs: Vec::new(),
        }
    }

    fn connection_uri(&self) -> ProvisionResult<(String, Option<String>)> {
        match self.descriptor.endpoint() {
            Some(Endpoint::HostPort {
                host,
                port,
                database,
            }) => Ok((
                format!("mongodb://{host}:{port}"),
                Some(database.clone()),
            )),
            Some(Endpoint::Uri { uri }) => Ok((uri.clone(), None)),
            None => Err(ProvisionError::node(
                0,
                EngineError::connection("document descriptor lacks an endpoint"),
            )),
        }
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
impl BackendProvisioner for DocumentProvisioner {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision_node(&mut self, node_id: usize) -> ProvisionResult<Box<dyn EngineInstance>> {
        let (uri, database) = self.connection_uri()?;
        let options = ClientOptions::parse(&uri)
            .await
            .map_err(|err| ProvisionError::node(node_id, EngineError::connection(err.to_string())))?;
        let database = database
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DOCUMENT_DATABASE_NAME_DEFAULT.to_string());

        let client = Client::with_options(options)
            .map_err(|err| ProvisionError::node(node_id, EngineError::connection(err.to_string())))?;

        // The client connects lazily; ping so an unreachable endpoint fails
        // this attempt instead of the first benchmark operation.
        client
            .database(&database)
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|err| ProvisionError::node(node_id, EngineError::connection(err.to_string())))?;

        if self.admin.is_none() {
            self.admin = Some((client.clone(), database.clone()));
        }
        let blob_store_dir = self.blob_store_dir(node_id).await?;

        tracing::debug!(node_id, database = %database, "document node provisioned");
        Ok(Box::new(DocumentEngine {
            kind: self.descriptor.kind(),
            node_id,
            client,
            database,
            blob_store_dir,
            extensions: ExtensionRegistry::new(),
        }))
    }

    async fn tear_down(&mut self) -> ProvisionResult<()> {
        let mut failures = Vec::new();

        if let Some((client, database)) = self.admin.take() {
            if self.descriptor.drop_store_after_test() {
                match client.database(&database).drop(None).await {
                    Ok(()) => tracing::info!(database = %database, "document database dropped"),
                    Err(err) => failures.push(format!("drop {database}: {err}")),
                }
            } else {
                tracing::info!(database = %database, "document database left for inspection");
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
