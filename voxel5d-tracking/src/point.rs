//! Point landmarks.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use voxel5d_core::util::{round_to_i64, usize_to_f64};

/// Default marker colour (packed `0xRRGGBB`).
pub const DEFAULT_MARKER_COLOR: u32 = 0x00FF_FFFF;

/// A landmark in `(x, y, z, channel, time)` voxel coordinates.
///
/// The intensity fields cache the result of the last localization.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct APoint {
    pub coords: [f64; 5],
    pub integral: f64,
    pub max: f64,
    pub min: f64,
    pub integral_above_min: f64,
    pub tagged: bool,
    pub color: u32,
    pub displayed: bool,
}

impl Default for APoint {
    fn default() -> Self {
        Self {
            coords: [0.0; 5],
            integral: 0.0,
            max: 0.0,
            min: 0.0,
            integral_above_min: 0.0,
            tagged: false,
            color: DEFAULT_MARKER_COLOR,
            displayed: false,
        }
    }
}

impl APoint {
    /// Creates a point at the given coordinates.
    #[must_use]
    pub fn new(coords: [f64; 5]) -> Self {
        Self {
            coords,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn x(&self) -> f64 {
        self.coords[0]
    }

    #[must_use]
    pub fn y(&self) -> f64 {
        self.coords[1]
    }

    #[must_use]
    pub fn z(&self) -> f64 {
        self.coords[2]
    }

    /// Channel index of the point (rounded, never negative).
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn channel(&self) -> usize {
        round_to_i64(self.coords[3]).max(0) as usize
    }

    /// Time index of the point (rounded, never negative).
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn time(&self) -> usize {
        round_to_i64(self.coords[4]).max(0) as usize
    }

    /// Spatial position as used by volume lookups.
    #[must_use]
    pub fn spatial(&self) -> [f64; 3] {
        [self.coords[0], self.coords[1], self.coords[2]]
    }

    /// All coordinates rounded to the nearest voxel.
    #[must_use]
    pub fn rounded(&self) -> [i64; 5] {
        self.coords.map(round_to_i64)
    }

    /// Squared spatial distance to `other`, each axis multiplied by `scales`.
    #[must_use]
    pub fn sqr_dist_to(&self, other: &APoint, scales: [f64; 3]) -> f64 {
        (0..3)
            .map(|d| {
                let delta = (self.coords[d] - other.coords[d]) * scales[d];
                delta * delta
            })
            .sum()
    }

    /// Squared distance in the XY plane only.
    #[must_use]
    pub fn sqr_xy_dist_to(&self, other: &APoint, scales: [f64; 2]) -> f64 {
        let dx = (self.coords[0] - other.coords[0]) * scales[0];
        let dy = (self.coords[1] - other.coords[1]) * scales[1];
        dx * dx + dy * dy
    }

    /// Unscaled squared distance over every axis except `skip`.
    #[must_use]
    pub fn sqr_dist_excluding(&self, other: &APoint, skip: usize) -> f64 {
        (0..5)
            .filter(|&d| d != skip)
            .map(|d| {
                let delta = self.coords[d] - other.coords[d];
                delta * delta
            })
            .sum()
    }

    /// Whether both points lie on the same voxel plane along `axis`.
    #[must_use]
    pub fn same_plane(&self, other: &APoint, axis: usize) -> bool {
        round_to_i64(self.coords[axis]) == round_to_i64(other.coords[axis])
    }

    /// Copy the cached localization results of `other`.
    pub fn copy_intensities(&mut self, other: &APoint) {
        self.integral = other.integral;
        self.max = other.max;
        self.min = other.min;
        self.integral_above_min = other.integral_above_min;
    }

    pub fn toggle_tag(&mut self) {
        self.tagged = !self.tagged;
    }
}

/// Clamp every coordinate of `point` into `[0, size - 1]` of the 5D `sizes`.
pub fn constrain_point(point: &mut APoint, sizes: [usize; 5]) {
    for (c, &size) in point.coords.iter_mut().zip(&sizes) {
        let top = usize_to_f64(size.saturating_sub(1));
        *c = c.clamp(0.0, top);
    }
}
