//! Error types for voxel5d-core.

use thiserror::Error;

use crate::kind::ValueKind;

/// Result type alias for voxel5d operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for voxel5d operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Two volumes that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    /// Voxel coordinate outside of the volume.
    #[error("voxel coordinate out of range: ({x}, {y}, {z})")]
    OutOfRange { x: i64, y: i64, z: i64 },

    /// The final channel of a set cannot be deleted.
    #[error("cannot delete the last remaining channel")]
    LastChannel,

    /// Channel index does not exist.
    #[error("invalid channel index: {index} (channels: {count})")]
    ChannelIndex { index: usize, count: usize },

    /// Time index does not exist.
    #[error("invalid time index: {index} (time points: {count})")]
    TimeIndex { index: usize, count: usize },

    /// The storage kind does not support the requested operation.
    #[error("unsupported conversion for {kind:?}: {operation}")]
    UnsupportedConversion {
        kind: ValueKind,
        operation: &'static str,
    },

    /// Allocating a volume buffer failed.
    #[error("cannot allocate {bytes} bytes for volume storage")]
    ResourceExhausted { bytes: usize },

    /// Shape is empty or overflows the address space.
    #[error("invalid volume shape: {0:?}")]
    InvalidShape([usize; 3]),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
