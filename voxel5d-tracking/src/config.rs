//! Tracking configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether localization climbs to bright or to dark spots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SearchMode {
    #[default]
    Max,
    Min,
}

impl SearchMode {
    /// Sign applied to calibrated values so that the search always maximises.
    #[must_use]
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            SearchMode::Max => 1.0,
            SearchMode::Min => -1.0,
        }
    }
}

/// What autotrack does once a marker falls below the finish threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FinishMode {
    /// Keep tracking regardless of the criterion.
    #[default]
    None,
    /// Stop moving; further markers stay at the last accepted position.
    Freeze,
    /// End the track at the failing marker.
    Stop,
}

/// Marker statistic compared against its running maximum along the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FinishCriterion {
    #[default]
    Max,
    Integral,
    IntegralAboveMin,
}

/// Configuration for localization and autotrack.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingConfig {
    /// Half-widths of the search box along X, Y, Z.
    pub half_widths: [usize; 3],
    /// Full width at half maximum of the spot model, in voxels.
    pub fwhm: f64,
    /// Move markers to the centre of intensity after the maximum search.
    pub use_coi: bool,
    /// Climb to the closest local extremum before refining.
    pub iterate_max: bool,
    pub search_mode: SearchMode,
    /// Penalise positions already claimed by markers of other lists.
    pub repulsion: bool,
    /// Axis (0..=4) along which traces advance.
    pub track_direction: usize,
    pub finish_mode: FinishMode,
    pub finish_criterion: FinishCriterion,
    /// Fraction of the running maximum below which a marker fails.
    pub finish_threshold: f64,
    /// Iteration cap of the closest-extremum climb.
    pub max_iterations: usize,
    /// Depth bound of every lineage walk.
    pub max_lineage_depth: usize,
    /// Shift seeds by the registration difference between successive steps.
    pub correct_registration: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            half_widths: [3, 3, 1],
            fwhm: 2.0,
            use_coi: true,
            iterate_max: true,
            search_mode: SearchMode::Max,
            repulsion: false,
            track_direction: 4,
            finish_mode: FinishMode::None,
            finish_criterion: FinishCriterion::Max,
            finish_threshold: 0.5,
            max_iterations: 100,
            max_lineage_depth: 1024,
            correct_registration: true,
        }
    }
}

impl TrackingConfig {
    #[must_use]
    pub fn with_half_widths(mut self, half_widths: [usize; 3]) -> Self {
        self.half_widths = half_widths;
        self
    }

    #[must_use]
    pub fn with_fwhm(mut self, fwhm: f64) -> Self {
        self.fwhm = fwhm;
        self
    }

    #[must_use]
    pub fn with_coi(mut self, use_coi: bool) -> Self {
        self.use_coi = use_coi;
        self
    }

    #[must_use]
    pub fn with_iterate_max(mut self, iterate_max: bool) -> Self {
        self.iterate_max = iterate_max;
        self
    }

    #[must_use]
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    #[must_use]
    pub fn with_repulsion(mut self, repulsion: bool) -> Self {
        self.repulsion = repulsion;
        self
    }

    /// Set the track direction; values above 4 are clamped to the time axis.
    #[must_use]
    pub fn with_track_direction(mut self, axis: usize) -> Self {
        self.track_direction = axis.min(4);
        self
    }

    /// Set the finish mode together with its criterion and threshold.
    #[must_use]
    pub fn with_finish(mut self, mode: FinishMode, criterion: FinishCriterion, threshold: f64) -> Self {
        self.finish_mode = mode;
        self.finish_criterion = criterion;
        self.finish_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    #[must_use]
    pub fn with_max_lineage_depth(mut self, depth: usize) -> Self {
        self.max_lineage_depth = depth.max(1);
        self
    }

    #[must_use]
    pub fn with_registration_correction(mut self, correct: bool) -> Self {
        self.correct_registration = correct;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackingConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.max_lineage_depth, 1024);
        assert_eq!(config.track_direction, 4);
        assert_eq!(config.finish_mode, FinishMode::None);
    }

    #[test]
    fn test_builders_clamp() {
        let config = TrackingConfig::default()
            .with_track_direction(9)
            .with_max_iterations(0)
            .with_search_mode(SearchMode::Min);
        assert_eq!(config.track_direction, 4);
        assert_eq!(config.max_iterations, 1);
        assert!((config.search_mode.sign() + 1.0).abs() < f64::EPSILON);
    }
}
