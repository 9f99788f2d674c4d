//! voxel5d-core: Typed voxel volumes and the data model of a five-dimensional viewer.
//!
//! A [`VolumeSet`] holds `channels x times` [`VoxelVolume`]s of one shape.
//! Each volume stores one value kind, carries its own calibration and a
//! registration shift, and maps raw values to colour-table indices through a
//! [`DisplayWindow`]. Regions of interest ([`Roi`]), gating ([`Gate`]) and
//! colour tables ([`ColorLut`]) complete the model used by the render and
//! tracking crates.

pub mod error;
pub mod gate;
pub mod histogram;
pub mod kind;
pub mod lut;
pub mod roi;
pub mod set;
pub mod util;
pub mod volume;

pub use error::{Error, Result};
pub use gate::Gate;
pub use histogram::Histogram3D;
pub use kind::{ComplexMode, ValueKind};
pub use lut::{
    ColorLut, ColorModel, ColormapRegistry, UserTable, OVERFLOW_COLOR, TABLE_SIZE,
    UNDERFLOW_COLOR,
};
pub use roi::{plane_axes, Halfspace, Rect2D, Roi};
pub use set::{remap_after_delete, ColorSlot, VolumeSet};
pub use volume::{
    ArithOp, Calibration, DisplayWindow, Voxel, VoxelData, VoxelVolume, DIVISION_SENTINEL,
};
