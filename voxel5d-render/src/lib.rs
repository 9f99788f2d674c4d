//! voxel5d-render: Slices, projections and colour compositing of voxel volumes.
//!
//! - [`SliceProjector`] - cached orthogonal slices and MIP/average projections
//!   with ROI statistics and a 1D marginal
//! - [`composite`] - blends per-channel index buffers through their colour tables
//! - [`DisplaySession`] - a volume set with per-channel display state
//!
//! Projections and slices share one pixel layout per viewing axis: viewing
//! along X shows `(z, y)`, along Y shows `(x, z)` and along Z shows `(x, y)`.

pub mod composite;
pub mod projector;
pub mod session;

pub use composite::{composite, to_rgb_bytes, Layer, OverlayMode, OPAQUE_BLACK};
pub use projector::{
    marginal_axis, ProjectionConfig, ProjectionMode, ProjectionStats, SliceProjector,
};
pub use session::{ChannelDisplay, DisplaySession};
