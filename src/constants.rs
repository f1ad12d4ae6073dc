//! Fixture Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `SEGMENT_FILE_SIZE_MB_DEFAULT` (not `DEFAULT_SEGMENT_FILE_SIZE`)
//!
//! Every constant includes units in the name:
//! - _BYTES for size limits
//! - _MB for megabyte sizes
//! - _`COUNT_MAX/MIN` for quantity limits

// =============================================================================
// Cluster Limits
// =============================================================================

/// Maximum number of nodes a single fixture will address
pub const CLUSTER_SIZE_COUNT_MAX: usize = 64;

// =============================================================================
// Node-Store Cache Defaults
// =============================================================================

/// Default node-store cache size
pub const CACHE_SIZE_BYTES_DEFAULT: usize = 16 * 1024 * 1024; // 16MB

// =============================================================================
// Segment Store Defaults
// =============================================================================

/// Default maximum size of a single segment file
pub const SEGMENT_FILE_SIZE_MB_DEFAULT: usize = 256;

/// Default segment store cache size
pub const SEGMENT_CACHE_SIZE_MB_DEFAULT: usize = 256;

/// Name of the segment store journal file
pub const SEGMENT_JOURNAL_FILE_NAME: &str = "journal.log";

/// Name of the directory holding segment files within a node store
pub const SEGMENT_DATA_DIR_NAME: &str = "segments";

/// Name of the directory holding the file blob store within a node store
pub const BLOB_STORE_DIR_NAME: &str = "blobs";

// =============================================================================
// Blob Store Defaults
// =============================================================================

/// Default blob-store cache size
pub const BLOB_CACHE_SIZE_MB_DEFAULT: usize = 16;

// =============================================================================
// Multiplexed Overlay Limits
// =============================================================================

/// Minimum number of mounts in a multiplexed overlay
pub const MOUNT_COUNT_MIN: usize = 1;

/// Maximum number of mounts in a multiplexed overlay
pub const MOUNT_COUNT_MAX: usize = 64;

// =============================================================================
// Service Registry Keys
// =============================================================================

/// Service kind under which the statistics sink is registered on every engine
pub const STATISTICS_SERVICE_KIND: &str = "statistics-sink";

// =============================================================================
// Document Backend Defaults
// =============================================================================

/// Database used when a document URI names none
pub const DOCUMENT_DATABASE_NAME_DEFAULT: &str = "quarry-bench";

// =============================================================================
// Relational Backend Limits
// =============================================================================

/// Maximum connections per relational node pool
pub const RELATIONAL_POOL_CONNECTIONS_COUNT_MAX: u32 = 10;

/// Table prefix used when a relational descriptor names none
pub const RELATIONAL_TABLE_PREFIX_DEFAULT: &str = "quarry";

/// Tables created per relational store, without prefix
pub const RELATIONAL_TABLE_NAMES: [&str; 4] = ["nodes", "clusternodes", "settings", "journal"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_sane() {
        assert!(CLUSTER_SIZE_COUNT_MAX >= 2, "clusters must be addressable");
        assert!(MOUNT_COUNT_MIN <= MOUNT_COUNT_MAX);
        assert!(CACHE_SIZE_BYTES_DEFAULT > 0);
        assert!(SEGMENT_FILE_SIZE_MB_DEFAULT > 0);
    }
}
