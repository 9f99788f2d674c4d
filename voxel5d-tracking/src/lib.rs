//! voxel5d-tracking: Point landmarks and their traces through a 5D volume set.
//!
//! Markers ([`APoint`]) are kept in ordered [`MarkerList`]s, one per trace.
//! Lists form a lineage forest inside a [`MarkerLists`] arena, so a trace
//! can split into two children (a dividing cell, a branching filament).
//!
//! [`Localizer`] moves a seed onto the nearest intensity extremum and refines
//! it to the gated centre of intensity; [`autotrack`] repeats that along the
//! track direction, and [`MarkerDrag`] repositions one marker by hand.
//! [`TraceSummary`] and [`msd_from_list`] describe the resulting motion, and
//! [`MarkerRow`] is the flat form used for export.

pub mod autotrack;
pub mod config;
pub mod drag;
pub mod error;
pub mod list;
pub mod lists;
pub mod localize;
pub mod point;
pub mod stats;
pub mod table;

pub use autotrack::{
    align_offsets_to_track, autotrack, reset_offsets, split_at, subtract_tracked_spots,
    AutoTrackReport,
};
pub use config::{FinishCriterion, FinishMode, SearchMode, TrackingConfig};
pub use drag::{DragState, MarkerDrag};
pub use error::{Result, TrackingError};
pub use list::MarkerList;
pub use lists::{MarkerLists, DEFAULT_MAX_DEPTH};
pub use localize::{place_marker, Localizer};
pub use point::{constrain_point, APoint, DEFAULT_MARKER_COLOR};
pub use stats::{msd_from_list, summarize, TraceSummary};
pub use table::{channel_calibrations, grow_volumes_for, ImportReport, MarkerRow, COLUMNS};
