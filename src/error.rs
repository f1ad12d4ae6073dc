//! Fixture Errors
//!
//! Explicit error types with context. Configuration errors surface before
//! any resource is touched; provisioning errors surface after rollback has
//! completed, carrying the underlying cause; teardown errors are aggregated
//! and reported once everything has been attempted.

use thiserror::Error;

use crate::backend::ProvisionError;

/// Errors from fixture operations.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Descriptor is missing or has an invalid required field for its kind
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// What was missing or invalid
        message: String,
    },

    /// A backend instance failed to construct; the cluster was rolled back
    #[error("provisioning failed: {0}")]
    Provisioning(#[from] ProvisionError),

    /// A customization hook failed; the cluster was rolled back
    #[error("customization failed: {message}")]
    Customization {
        /// The hook's failure message
        message: String,
    },

    /// The operation is declared but intentionally not implemented
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Name of the unsupported operation
        operation: String,
    },

    /// One or more nodes failed graceful shutdown during teardown
    #[error("cluster teardown reported {} failure(s)", failures.len())]
    Shutdown {
        /// One entry per failed node or backend release
        failures: Vec<String>,
    },

    /// A cluster is already live under this fixture
    #[error("a cluster is already live; tear it down first")]
    ClusterActive,
}

impl FixtureError {
    /// Create an invalid-configuration error.
    #[must_use]
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a customization error.
    #[must_use]
    pub fn customization(message: impl Into<String>) -> Self {
        Self::Customization {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}

/// Result type for fixture operations.
pub type FixtureResult<T> = Result<T, FixtureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = FixtureError::invalid_configuration("endpoint missing");
        assert!(
            matches!(err, FixtureError::InvalidConfiguration { message } if message == "endpoint missing")
        );

        let err = FixtureError::unsupported("sync_repository_cluster");
        assert!(
            matches!(err, FixtureError::Unsupported { operation } if operation == "sync_repository_cluster")
        );
    }

    #[test]
    fn test_shutdown_error_counts_failures() {
        let err = FixtureError::Shutdown {
            failures: vec!["node 0: closed".into(), "node 2: closed".into()],
        };
        assert_eq!(err.to_string(), "cluster teardown reported 2 failure(s)");
    }
}
