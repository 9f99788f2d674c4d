//! Raw volume loading through a memory map, bounded by a memory budget.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use voxel5d_core::{ValueKind, VoxelVolume};

use crate::{Error, Result};

/// How much memory decoded volumes may take.
///
/// The budget is either given in bytes or taken as a share of the memory the
/// system currently reports free.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Share of free memory one decoded volume may occupy, in `(0, 1]`.
    pub memory_fraction: f64,
    /// Fixed budget in bytes; takes precedence over `memory_fraction`.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            memory_fraction: 0.5,
            memory_budget_bytes: None,
        }
    }
}

impl LoadConfig {
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    /// Use a fixed budget instead of a share of free memory.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Bytes a decoded volume may occupy.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMemoryFraction`] for a share outside `(0, 1]`
    /// and [`Error::MemoryUnavailable`] when no free memory is reported.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn volume_budget(&self) -> Result<usize> {
        if let Some(bytes) = self.memory_budget_bytes {
            return Ok(bytes);
        }
        let fraction = self.memory_fraction;
        if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
            return Err(Error::InvalidMemoryFraction(fraction));
        }
        let mut system = System::new();
        system.refresh_memory();
        let free = system.available_memory();
        if free == 0 {
            return Err(Error::MemoryUnavailable);
        }
        let share = (free as f64 * fraction).floor() as u64;
        log::debug!("volume budget {share} of {free} free bytes");
        Ok(usize::try_from(share).unwrap_or(usize::MAX))
    }
}

/// A memory-mapped raw volume file: little-endian voxels, x fastest, no header.
pub struct RawVolumeLoader {
    mmap: Mmap,
    path: PathBuf,
}

impl RawVolumeLoader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the file as one volume of `kind` and `shape`.
    ///
    /// The file length must match the shape exactly, and the decoded volume
    /// must fit the budget resolved from `config`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for a length mismatch,
    /// [`Error::ResourceExhausted`] over budget, and core errors for invalid shapes.
    pub fn load(&self, kind: ValueKind, shape: [usize; 3], config: &LoadConfig) -> Result<VoxelVolume> {
        let voxels = shape
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .ok_or(voxel5d_core::Error::InvalidShape(shape))?;
        let bytes = voxels
            .checked_mul(kind.bytes_per_voxel())
            .ok_or(voxel5d_core::Error::InvalidShape(shape))?;
        if bytes != self.mmap.len() {
            return Err(Error::InvalidFormat(format!(
                "{}: {} bytes, but {kind} {shape:?} needs {bytes}",
                self.path.display(),
                self.mmap.len()
            )));
        }
        let budget = config.volume_budget()?;
        if bytes > budget {
            return Err(Error::ResourceExhausted { bytes, budget });
        }

        let data = &self.mmap[..];
        let mut volume = match kind {
            ValueKind::U8 => VoxelVolume::from_vec(shape, data.to_vec())?,
            ValueKind::U16 => VoxelVolume::from_vec(shape, decode(data, u16::from_le_bytes))?,
            ValueKind::I32 => VoxelVolume::from_vec(shape, decode(data, i32::from_le_bytes))?,
            ValueKind::F32 => VoxelVolume::from_vec(shape, decode(data, f32::from_le_bytes))?,
            ValueKind::F64 => VoxelVolume::from_vec(shape, decode(data, f64::from_le_bytes))?,
            ValueKind::Complex64 => {
                let pairs = decode(data, |b: [u8; 8]| {
                    let [r0, r1, r2, r3, i0, i1, i2, i3] = b;
                    [
                        f32::from_le_bytes([r0, r1, r2, r3]),
                        f32::from_le_bytes([i0, i1, i2, i3]),
                    ]
                });
                VoxelVolume::from_vec(shape, pairs)?
            }
        };
        volume.recompute_min_max();
        log::info!(
            "loaded {} as {kind} {shape:?} (raw range {} .. {})",
            self.path.display(),
            volume.min_raw(),
            volume.max_raw()
        );
        Ok(volume)
    }
}

fn decode<T, const N: usize>(bytes: &[u8], convert: impl Fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            convert(raw)
        })
        .collect()
}
