//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited table error.
    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Memory fraction outside `(0, 1]`.
    #[error("memory fraction {0} is outside (0, 1]")]
    InvalidMemoryFraction(f64),

    /// The operating system reported no free memory to size volumes against.
    #[error("no available memory reported for volume loading")]
    MemoryUnavailable,

    /// The data would not fit the memory budget.
    #[error("{bytes} bytes exceed the memory budget of {budget} bytes")]
    ResourceExhausted { bytes: usize, budget: usize },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] voxel5d_core::Error),

    /// Tracking error.
    #[error("tracking error: {0}")]
    Tracking(#[from] voxel5d_tracking::TrackingError),
}
