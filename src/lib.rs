//! # Quarry
//!
//! Storage-cluster fixtures for content-repository benchmarks.
//!
//! ## Features
//!
//! - **📦 Backend Descriptors**: One value type describing every supported
//!   storage backend, from in-memory to document and relational stores
//! - **🏗️ All-or-Nothing Provisioning**: A cluster either comes up whole or
//!   rolls back whole, never half-built
//! - **📊 Statistics Binding**: One sink wired into every node's extension
//!   registry before customization runs
//! - **🔧 Customization Hooks**: Per-node builder access during provisioning
//! - **♻️ Idempotent Teardown**: Tear down twice, tear down after a failed
//!   setup, tear down nothing at all
//! - **🎯 Deterministic Fault Injection**: Seeded provisioning failures for
//!   reproducible rollback tests
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::{BackendDescriptor, RepositoryFixture};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Describe the backend, then build a fixture for it
//! let descriptor = BackendDescriptor::memory(16 * 1024 * 1024)?;
//! let mut fixture = RepositoryFixture::new(descriptor)?;
//!
//! // Provision a three-node cluster
//! let handles = fixture.set_up_cluster(3).await?;
//! assert_eq!(handles.len(), 3);
//!
//! // Run the benchmark against the handles, then release everything
//! fixture.tear_down_cluster().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  RepositoryFixture                      │
//! │        set_up_cluster / tear_down_cluster               │
//! ├─────────────────────────────────────────────────────────┤
//! │  StatisticsSink   │ Customizer hook │ RepositoryHandle  │
//! ├─────────────────────────────────────────────────────────┤
//! │             BackendProvisioner (per kind)               │
//! │  memory │ segment │ composite │ document │ relational   │
//! ├─────────────────────────────────────────────────────────┤
//! │  EngineInstance + ExtensionRegistry                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! - [`RepositoryFixture`](fixture::RepositoryFixture) - Cluster lifecycle
//!   manager, the main API
//! - [`BackendDescriptor`](backend::BackendDescriptor) - Immutable backend
//!   description with one constructor per topology
//! - [`BackendProvisioner`](backend::BackendProvisioner) - Per-backend node
//!   construction and resource release
//! - [`StatisticsSink`](stats::StatisticsSink) - Instrumentation boundary
//!   bound into every node
//!
//! ## Feature Flags
//!
//! - `document` - MongoDB document-store backend
//! - `relational` - PostgreSQL relational backend
//!
//! Descriptors for gated backends always construct; resolving a provisioner
//! for a kind that was not compiled in fails fast with a configuration error.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod stats;

// Re-export common types
pub use backend::{
    BackendDescriptor, BackendKind, BackendProvisioner, CompositeProvisioner, Credentials,
    Endpoint, MemoryEngine, MemoryFaults, MemoryProvisioner, Mount, MountResolver, ProvisionError,
    ProvisionResult, SegmentProvisioner,
};
pub use engine::{EngineError, EngineInstance, EngineResult, ExtensionRegistry};
pub use error::{FixtureError, FixtureResult};
pub use fixture::{RepositoryBuilder, RepositoryFixture, RepositoryHandle};
pub use stats::{NoopStatisticsSink, RecordingStatisticsSink, StatisticsBinding, StatisticsSink};

#[cfg(feature = "document")]
pub use backend::DocumentProvisioner;

#[cfg(feature = "relational")]
pub use backend::RelationalProvisioner;
