//! Storage Backends
//!
//! Descriptors, provisioners, and engines for every backend kind a fixture
//! can run against:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               BackendProvisioner Trait                       │
//! └─────────────────────────────────────────────────────────────┘
//!      ↑             ↑              ↑             ↑         ↑
//! ┌────┴────┐ ┌──────┴─────┐ ┌──────┴─────┐ ┌────┴───┐ ┌───┴──┐
//! │ Memory  │ │ SegmentFile│ │ Composite  │ │Document│ │ RDB  │
//! └─────────┘ └────────────┘ └────────────┘ └────────┘ └──────┘
//!                                            (feature)  (feature)
//! ```
//!
//! A [`BackendDescriptor`] selects and parameterizes one kind; its
//! [`provisioner`](BackendDescriptor::provisioner) method resolves the
//! matching implementation.

mod composite;
mod descriptor;
mod memory;
mod provisioner;
mod segment;

#[cfg(feature = "document")]
mod document;

#[cfg(feature = "relational")]
mod relational;

pub use composite::{CompositeEngine, CompositeProvisioner, Mount, MountResolver};
pub use descriptor::{BackendDescriptor, BackendKind, Credentials, Endpoint};
pub use memory::{MemoryEngine, MemoryFaults, MemoryProvisioner};
pub use provisioner::{BackendProvisioner, ProvisionError, ProvisionResult};
pub use segment::{SegmentEngine, SegmentProvisioner};

#[cfg(feature = "document")]
pub use document::{DocumentEngine, DocumentProvisioner};

#[cfg(feature = "relational")]
pub use relational::{RelationalEngine, RelationalProvisioner};

use crate::error::FixtureResult;

impl BackendDescriptor {
    /// Resolve this descriptor to its backend provisioner.
    ///
    /// # Errors
    /// `InvalidConfiguration` when the kind's driver support is not compiled
    /// into this build.
    pub fn provisioner(&self) -> FixtureResult<Box<dyn BackendProvisioner>> {
        match self.kind() {
            BackendKind::Memory => Ok(Box::new(MemoryProvisioner::new(self.clone()))),
            BackendKind::SegmentFile | BackendKind::SegmentFileWithBlobs => {
                Ok(Box::new(SegmentProvisioner::new(self.clone())))
            }
            BackendKind::MultiplexedOverlay => {
                Ok(Box::new(CompositeProvisioner::new(self.clone())))
            }
            #[cfg(feature = "document")]
            BackendKind::Document | BackendKind::DocumentWithBlobs => {
                Ok(Box::new(DocumentProvisioner::new(self.clone())))
            }
            #[cfg(not(feature = "document"))]
            BackendKind::Document | BackendKind::DocumentWithBlobs => {
                Err(crate::error::FixtureError::invalid_configuration(
                    "document backend support is not compiled in (enable the `document` feature)",
                ))
            }
            #[cfg(feature = "relational")]
            BackendKind::Relational | BackendKind::RelationalWithBlobs => {
                Ok(Box::new(RelationalProvisioner::new(self.clone())))
            }
            #[cfg(not(feature = "relational"))]
            BackendKind::Relational | BackendKind::RelationalWithBlobs => {
                Err(crate::error::FixtureError::invalid_configuration(
                    "relational backend support is not compiled in (enable the `relational` feature)",
                ))
            }
        }
    }
}
