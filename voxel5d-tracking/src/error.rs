//! Tracking error types.

use thiserror::Error;

/// Result type for tracking operations.
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Tracking error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// Marker list index does not exist.
    #[error("invalid marker list index: {index} (lists: {count})")]
    ListIndex { index: usize, count: usize },

    /// Marker index does not exist within its list.
    #[error("invalid marker index: {index} (markers: {count})")]
    MarkerIndex { index: usize, count: usize },

    /// The operation needs at least one marker in the list.
    #[error("marker list {0} is empty")]
    EmptyList(usize),

    /// A lineage walk exceeded the depth bound, which means the parent/child links form a cycle.
    #[error("malformed lineage: walk from list {start} exceeded depth {depth}")]
    MalformedLineage { start: usize, depth: usize },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] voxel5d_core::Error),
}
