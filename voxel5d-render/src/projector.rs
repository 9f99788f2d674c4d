//! Orthogonal slices and projections of one volume along one axis.
//!
//! A [`SliceProjector`] owns the 2D index buffer for one viewing axis. Slices
//! map voxels through the volume's fixed display window; projections are
//! rescaled so that the largest projected index fills the colour table.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use voxel5d_core::util::{f64_to_index_clamped, usize_to_f64, usize_to_i64};
use voxel5d_core::{plane_axes, Error, Gate, Result, Roi, VoxelVolume};

/// How the projected axis is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProjectionMode {
    /// Maximum intensity projection.
    #[default]
    Mip,
    /// Mean over contributing voxels.
    Average,
}

/// Projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionConfig {
    /// Reduction along the projected axis.
    pub mode: ProjectionMode,
    /// Also compute the 1D marginal vector.
    pub marginal: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Mip,
            marginal: true,
        }
    }
}

impl ProjectionConfig {
    /// Set the reduction mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ProjectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the marginal vector.
    #[must_use]
    pub fn with_marginal(mut self, marginal: bool) -> Self {
        self.marginal = marginal;
        self
    }
}

/// Aggregates over every voxel that contributed to the last projection,
/// in calibrated units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionStats {
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub voxels: usize,
}

impl Default for ProjectionStats {
    fn default() -> Self {
        Self {
            sum: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            average: f64::NAN,
            voxels: 0,
        }
    }
}

/// Dimension binned by the 1D marginal for a viewing axis.
///
/// Viewing along X bins over Y, along Y over X and along Z over Z.
#[must_use]
#[inline]
pub fn marginal_axis(axis: usize) -> usize {
    match axis {
        0 => 1,
        1 => 0,
        _ => 2,
    }
}

#[inline]
fn voxel_at(axis: usize, u: usize, v: usize, w: usize) -> [usize; 3] {
    let (ua, va) = plane_axes(axis);
    let mut p = [0usize; 3];
    p[ua] = u;
    p[va] = v;
    p[axis] = w;
    p
}

#[inline]
fn to_u32(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SliceKey {
    index: usize,
    reference: [i64; 3],
    own: [i64; 3],
}

/// Cached slice/projection buffers for one viewing axis.
#[derive(Debug, Clone)]
pub struct SliceProjector {
    axis: usize,
    width: usize,
    height: usize,
    config: ProjectionConfig,
    /// Display indices: the slice, or the rescaled projection.
    display: Vec<u32>,
    /// Projection indices before rescaling.
    indices: Vec<u32>,
    /// Projected calibrated values.
    values: Vec<f64>,
    /// Contributing voxels per projection pixel.
    counts: Vec<u32>,
    marginal: Vec<f64>,
    marginal_scale: f64,
    marginal_offset: f64,
    stats: ProjectionStats,
    last_slice: Option<SliceKey>,
    projected: bool,
    valid: bool,
}

impl SliceProjector {
    /// Empty projector for viewing axis 0 (X), 1 (Y) or 2 (Z).
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for an axis above 2.
    pub fn new(axis: usize, config: ProjectionConfig) -> Result<Self> {
        if axis > 2 {
            return Err(Error::ConfigError(format!("viewing axis {axis} out of range")));
        }
        Ok(Self {
            axis,
            width: 0,
            height: 0,
            config,
            display: Vec::new(),
            indices: Vec::new(),
            values: Vec::new(),
            counts: Vec::new(),
            marginal: Vec::new(),
            marginal_scale: 1.0,
            marginal_offset: 0.0,
            stats: ProjectionStats::default(),
            last_slice: None,
            projected: false,
            valid: false,
        })
    }

    /// Viewing axis.
    #[must_use]
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Buffer width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Buffer height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Projection settings.
    #[must_use]
    pub fn config(&self) -> ProjectionConfig {
        self.config
    }

    /// Reduction mode.
    #[must_use]
    pub fn mode(&self) -> ProjectionMode {
        self.config.mode
    }

    /// Switch between MIP and average; invalidates on change.
    pub fn set_mode(&mut self, mode: ProjectionMode) {
        if self.config.mode != mode {
            self.config.mode = mode;
            self.invalidate();
        }
    }

    /// Enable the marginal vector; invalidates on change.
    pub fn set_marginal(&mut self, marginal: bool) {
        if self.config.marginal != marginal {
            self.config.marginal = marginal;
            self.invalidate();
        }
    }

    /// Whether the buffer reflects the last request.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the buffer holds a projection rather than a slice.
    #[must_use]
    pub fn is_projection(&self) -> bool {
        self.valid && self.projected
    }

    /// Drop the cached buffer and reset the statistics.
    pub fn invalidate(&mut self) {
        if self.valid {
            log::debug!("invalidating axis {} projector", self.axis);
        }
        self.valid = false;
        self.last_slice = None;
        self.stats = ProjectionStats::default();
    }

    /// Current display-index buffer, row-major `u + width * v`.
    #[must_use]
    pub fn buffer(&self) -> &[u32] {
        &self.display
    }

    /// Display index at pixel `(u, v)`.
    #[must_use]
    pub fn pixel(&self, u: usize, v: usize) -> Option<u32> {
        (u < self.width && v < self.height).then(|| self.display[u + self.width * v])
    }

    /// Projection index at `(u, v)` before auto-contrast rescaling.
    #[must_use]
    pub fn projection_index(&self, u: usize, v: usize) -> Option<u32> {
        (self.is_projection() && u < self.width && v < self.height)
            .then(|| self.indices[u + self.width * v])
    }

    /// Projected calibrated value at `(u, v)`: the maximum for MIP, the mean for
    /// average; 0 for pixels without contributing voxels.
    #[must_use]
    pub fn projected_value(&self, u: usize, v: usize) -> Option<f64> {
        (self.is_projection() && u < self.width && v < self.height)
            .then(|| self.values[u + self.width * v])
    }

    /// Contributing voxels at `(u, v)` in the last projection.
    #[must_use]
    pub fn contributing(&self, u: usize, v: usize) -> Option<u32> {
        (self.is_projection() && u < self.width && v < self.height)
            .then(|| self.counts[u + self.width * v])
    }

    /// Statistics of the last projection (NaN after invalidation).
    #[must_use]
    pub fn stats(&self) -> ProjectionStats {
        self.stats
    }

    /// 1D marginal in calibrated units, one bin per position along [`marginal_axis`].
    #[must_use]
    pub fn marginal(&self) -> &[f64] {
        &self.marginal
    }

    /// Factor mapping the marginal into `[0, 1]` after subtracting the offset.
    #[must_use]
    pub fn marginal_scale(&self) -> f64 {
        self.marginal_scale
    }

    /// Marginal minimum subtracted before scaling.
    #[must_use]
    pub fn marginal_offset(&self) -> f64 {
        self.marginal_offset
    }

    /// Marginal bin normalised into `[0, 1]`.
    #[must_use]
    pub fn marginal_normalized(&self, bin: usize) -> Option<f64> {
        self.marginal
            .get(bin)
            .map(|m| (m - self.marginal_offset) * self.marginal_scale)
    }

    fn resize(&mut self, shape: [usize; 3]) {
        let (ua, va) = plane_axes(self.axis);
        self.width = shape[ua];
        self.height = shape[va];
        let n = self.width * self.height;
        self.display.clear();
        self.display.resize(n, 0);
    }

    /// Extract the one-voxel-thick cut at `index` along the viewing axis.
    ///
    /// Pixels address the frame of a volume registered with `reference_offset`
    /// (pass the volume's own offset for the active channel). Gated-out and
    /// out-of-bounds registered positions read 0. A repeated request with the
    /// same index and offsets is served from the cache.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] when `index` lies beyond the viewing axis.
    pub fn extract_slice(
        &mut self,
        volume: &VoxelVolume,
        gate: &Gate<'_>,
        index: usize,
        reference_offset: [i64; 3],
    ) -> Result<&[u32]> {
        let shape = volume.shape();
        if index >= shape[self.axis] {
            let mut at = [0i64; 3];
            at[self.axis] = usize_to_i64(index);
            return Err(Error::OutOfRange {
                x: at[0],
                y: at[1],
                z: at[2],
            });
        }
        let key = SliceKey {
            index,
            reference: reference_offset,
            own: volume.display_offset(),
        };
        if self.valid && !self.projected && self.last_slice == Some(key) {
            return Ok(&self.display);
        }

        self.resize(shape);
        for v in 0..self.height {
            for u in 0..self.width {
                let [x, y, z] = voxel_at(self.axis, u, v, index).map(usize_to_i64);
                let value = if gate.admits(x, y, z, reference_offset) {
                    volume
                        .display_index_at_offset(x, y, z, reference_offset)
                        .map_or(0, to_u32)
                } else {
                    0
                };
                self.display[u + self.width * v] = value;
            }
        }
        self.last_slice = Some(key);
        self.projected = false;
        self.valid = true;
        Ok(&self.display)
    }

    /// Project the volume along the viewing axis over in-ROI, gated-in voxels.
    ///
    /// The ROI is evaluated at display-shifted coordinates. MIP keeps the
    /// largest display index and calibrated value per pixel; average mode
    /// divides the sums by the contributing count (pixels without voxels stay 0).
    /// The display buffer is then rescaled so the largest index maps to the top
    /// of the table; with no signal the rescale is skipped.
    pub fn compute_projection(
        &mut self,
        volume: &VoxelVolume,
        roi: &Roi,
        gate: &Gate<'_>,
    ) -> ProjectionStats {
        if self.is_projection() {
            return self.stats;
        }
        let shape = volume.shape();
        self.resize(shape);
        let depth = shape[self.axis];
        let offset = volume.display_offset();
        let window = *volume.window();
        let n = self.width * self.height;
        let mip = self.config.mode == ProjectionMode::Mip;

        let mut indices = vec![0u32; n];
        let mut values = vec![0.0f64; n];
        let mut counts = vec![0u32; n];
        let m_axis = marginal_axis(self.axis);
        let m_len = if self.config.marginal { shape[m_axis] } else { 0 };
        let mut marginal = vec![0.0f64; m_len];
        let mut marginal_counts = vec![0usize; m_len];

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut voxels = 0usize;

        for v in 0..self.height {
            for u in 0..self.width {
                let mut best_index = 0u32;
                let mut best_value = f64::NEG_INFINITY;
                let mut sum_index = 0u64;
                let mut sum_value = 0.0;
                let mut count = 0u32;
                for w in 0..depth {
                    let p = voxel_at(self.axis, u, v, w);
                    let [xi, yi, zi] = p.map(usize_to_i64);
                    if !roi.in_range(xi + offset[0], yi + offset[1], zi + offset[2])
                        || !gate.admits(xi, yi, zi, offset)
                    {
                        continue;
                    }
                    let raw = volume.get_raw(p[0], p[1], p[2]);
                    let value = volume.calibration().calibrate(raw);
                    let index = to_u32(window.index(raw));
                    count += 1;
                    sum += value;
                    min = min.min(value);
                    max = max.max(value);
                    voxels += 1;
                    if mip {
                        best_index = best_index.max(index);
                        best_value = best_value.max(value);
                    } else {
                        sum_index += u64::from(index);
                        sum_value += value;
                    }
                    if self.config.marginal {
                        let bin = p[m_axis];
                        if mip {
                            marginal[bin] = if marginal_counts[bin] == 0 {
                                value
                            } else {
                                marginal[bin].max(value)
                            };
                        } else {
                            marginal[bin] += value;
                        }
                        marginal_counts[bin] += 1;
                    }
                }
                if count > 0 {
                    let at = u + self.width * v;
                    counts[at] = count;
                    if mip {
                        indices[at] = best_index;
                        values[at] = best_value;
                    } else {
                        indices[at] =
                            u32::try_from(sum_index / u64::from(count)).unwrap_or(u32::MAX);
                        values[at] = sum_value / f64::from(count);
                    }
                }
            }
        }

        let max_index = indices
            .iter()
            .zip(&counts)
            .filter(|(_, c)| **c > 0)
            .map(|(i, _)| *i)
            .max()
            .unwrap_or(0);
        if max_index == 0 {
            if voxels == 0 {
                log::warn!("axis {} projection is empty, skipping rescale", self.axis);
            }
            self.display.copy_from_slice(&indices);
        } else {
            let scale = usize_to_f64(window.levels.saturating_sub(1)) / f64::from(max_index);
            for (d, &i) in self.display.iter_mut().zip(&indices) {
                *d = to_u32(f64_to_index_clamped(f64::from(i) * scale, window.levels));
            }
        }

        self.normalize_marginal(&mut marginal, &marginal_counts, mip);
        self.marginal = marginal;
        self.indices = indices;
        self.values = values;
        self.counts = counts;
        self.stats = if voxels > 0 {
            ProjectionStats {
                sum,
                min,
                max,
                average: sum / usize_to_f64(voxels),
                voxels,
            }
        } else {
            ProjectionStats {
                sum: 0.0,
                voxels: 0,
                ..ProjectionStats::default()
            }
        };
        self.last_slice = None;
        self.projected = true;
        self.valid = true;
        log::debug!(
            "axis {} {:?} projection over {voxels} voxel(s), max index {max_index}",
            self.axis,
            self.config.mode
        );
        self.stats
    }

    fn normalize_marginal(&mut self, marginal: &mut [f64], counts: &[usize], mip: bool) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (m, &c) in marginal.iter_mut().zip(counts) {
            if c == 0 {
                continue;
            }
            if !mip {
                *m /= usize_to_f64(c);
            }
            lo = lo.min(*m);
            hi = hi.max(*m);
        }
        if lo <= hi {
            self.marginal_offset = lo;
            self.marginal_scale = if hi > lo { 1.0 / (hi - lo) } else { 1.0 };
        } else {
            self.marginal_offset = 0.0;
            self.marginal_scale = 1.0;
        }
    }
}
