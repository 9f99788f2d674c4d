//! voxel5d-io: file I/O for voxel5d.
//!
//! Raw volumes are read through a memory map and decoded under a memory
//! budget sized from available system memory. Marker lists are exchanged as
//! tab-separated tables, and session options as a JSON settings file.
//!

mod error;
mod loader;
mod settings;
mod table;

pub use error::{Error, Result};
pub use loader::{LoadConfig, RawVolumeLoader};
pub use settings::SettingsFile;
pub use table::{
    load_markers, save_markers, MarkerTableReader, MarkerTableWriter, SUMMARY_COLUMNS,
};
