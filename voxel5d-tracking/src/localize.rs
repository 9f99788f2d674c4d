//! Spot localization: closest-extremum climb, clipped centre of intensity
//! and the repulsion penalty between traces.
//!
//! All comparisons run on `sign * calibrated value`, where the sign comes from
//! [`SearchMode`](crate::SearchMode), so the Min mode never touches the
//! volume calibration. Intensities cached on a point are recorded in that
//! same orientation.

use voxel5d_core::util::{i64_to_f64, usize_to_f64, usize_to_i64};
use voxel5d_core::{VolumeSet, VoxelVolume};

use crate::config::TrackingConfig;
use crate::error::Result;
use crate::lists::MarkerLists;
use crate::point::{constrain_point, APoint};

/// Squared displacement below which the climb counts as converged.
const CONVERGENCE_SQR: f64 = 0.1;

/// Localizes points in a volume set, aware of the markers already placed.
#[derive(Debug, Clone, Copy)]
pub struct Localizer<'a> {
    volumes: &'a VolumeSet,
    lists: &'a MarkerLists,
    config: &'a TrackingConfig,
    exclude: Option<usize>,
}

impl<'a> Localizer<'a> {
    #[must_use]
    pub fn new(volumes: &'a VolumeSet, lists: &'a MarkerLists, config: &'a TrackingConfig) -> Self {
        Self {
            volumes,
            lists,
            config,
            exclude: None,
        }
    }

    /// Ignore the markers of `list` when computing the penalty.
    #[must_use]
    pub fn excluding(mut self, list: usize) -> Self {
        self.exclude = Some(list);
        self
    }

    fn volume_of(&self, point: &APoint) -> Result<&'a VoxelVolume> {
        Ok(self.volumes.volume(point.channel(), point.time())?)
    }

    #[inline]
    fn sample(&self, volume: &VoxelVolume, x: i64, y: i64, z: i64) -> f64 {
        self.config.search_mode.sign() * volume.calibration().calibrate(volume.get_raw_clamped(x, y, z))
    }

    /// Repulsion from markers of other lists on the same track-direction plane.
    ///
    /// Each such marker contributes its `integral_above_min`, scaled to a peak
    /// value, times a Gaussian falloff of the squared distance over the other
    /// four axes. Zero when repulsion is off.
    #[must_use]
    pub fn penalty(&self, point: &APoint) -> f64 {
        if !self.config.repulsion {
            return 0.0;
        }
        let direction = self.config.track_direction.min(4);
        let half = self.config.fwhm / 2.0;
        let sigma2 = half * half / std::f64::consts::LN_2;
        let peak_scale = VoxelVolume::int_max_scale(self.config.half_widths, self.config.fwhm);
        self.lists
            .lists()
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.exclude)
            .flat_map(|(_, list)| list.points())
            .filter(|other| other.same_plane(point, direction))
            .map(|other| {
                let r2 = point.sqr_dist_excluding(other, direction);
                let falloff = if sigma2 > 0.0 { (-r2 / sigma2).exp() } else { 0.0 };
                peak_scale * other.integral_above_min * falloff
            })
            .sum()
    }

    /// One climb step: the best penalised voxel of the search box around `point`.
    ///
    /// Ties keep the first candidate found in z, y, x scan order; the centre
    /// wins over every candidate that does not strictly improve on it.
    /// `max` of the result holds the penalised best value.
    ///
    /// # Errors
    /// Returns an index error when the point's channel or time does not exist.
    pub fn closest_max(&self, point: &APoint) -> Result<APoint> {
        let volume = self.volume_of(point)?;
        let rounded = point.rounded();
        let mut best = point.clone();
        for d in 0..3 {
            best.coords[d] = i64_to_f64(rounded[d]);
        }
        let mut best_value =
            self.sample(volume, rounded[0], rounded[1], rounded[2]) - self.penalty(&best);

        let (lo, hi) = volume.clipped_box(point.spatial(), self.config.half_widths);
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let value = self.sample(volume, usize_to_i64(x), usize_to_i64(y), usize_to_i64(z));
                    if value <= best_value {
                        continue;
                    }
                    let mut candidate = best.clone();
                    candidate.coords[0] = usize_to_f64(x);
                    candidate.coords[1] = usize_to_f64(y);
                    candidate.coords[2] = usize_to_f64(z);
                    let value = value - self.penalty(&candidate);
                    if value > best_value {
                        best_value = value;
                        best = candidate;
                    }
                }
            }
        }
        best.max = best_value;
        Ok(best)
    }

    /// Repeat [`Localizer::closest_max`] until successive candidates move by
    /// less than 0.1 voxel squared, or the iteration cap is reached.
    ///
    /// # Errors
    /// Returns an index error when the point's channel or time does not exist.
    pub fn iterative_closest_max(&self, seed: &APoint) -> Result<APoint> {
        let mut previous = seed.clone();
        let mut current = self.closest_max(seed)?;
        let mut iterations = 1;
        while current.sqr_dist_to(&previous, [1.0; 3]) > CONVERGENCE_SQR {
            if iterations >= self.config.max_iterations {
                log::warn!(
                    "closest maximum search stopped after {iterations} iterations at {:?}",
                    current.coords
                );
                break;
            }
            previous = current;
            current = self.closest_max(&previous)?;
            iterations += 1;
        }
        log::debug!("closest maximum after {iterations} iteration(s): {:?}", current.coords);
        Ok(current)
    }

    /// Record intensity statistics of the gated search box around `point`
    /// and, when `move_point` is set and the box is not flat, move the point
    /// to its background-subtracted centre of intensity.
    ///
    /// The background is the box minimum. Coordinates never go negative.
    ///
    /// # Errors
    /// Returns an index error when the point's channel or time does not exist.
    pub fn clipped_coi(&self, point: &mut APoint, move_point: bool) -> Result<()> {
        let volume = self.volume_of(point)?;
        let gate = self.volumes.gate_volume(point.time());
        let reference = volume.display_offset();
        let rounded = point.rounded();
        let center = self.sample(volume, rounded[0], rounded[1], rounded[2]);
        let mut max = center;
        let mut min = center;
        let mut sum = 0.0;
        let mut samples = Vec::new();

        let (lo, hi) = volume.clipped_box(point.spatial(), self.config.half_widths);
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let (xi, yi, zi) = (usize_to_i64(x), usize_to_i64(y), usize_to_i64(z));
                    if !gate.admits(xi, yi, zi, reference) {
                        continue;
                    }
                    let value = self.sample(volume, xi, yi, zi);
                    sum += value;
                    max = max.max(value);
                    min = min.min(value);
                    samples.push(([x, y, z], value));
                }
            }
        }
        if min >= max {
            min = 0.0;
        }
        let count = usize_to_f64(samples.len());
        point.integral = sum;
        point.max = max;
        point.min = min;
        point.integral_above_min = sum - count * min;
        if samples.is_empty() || !move_point || max <= min {
            return Ok(());
        }

        let mut weights = 0.0;
        let mut moments = [0.0; 3];
        for (pos, value) in &samples {
            let w = value - min;
            weights += w;
            for d in 0..3 {
                moments[d] += w * usize_to_f64(pos[d]);
            }
        }
        if weights > 0.0 {
            for d in 0..3 {
                point.coords[d] = (moments[d] / weights).max(0.0);
            }
        }
        Ok(())
    }

    /// Localize a spot from `seed`: clamp into the volume set, optionally
    /// climb to the closest extremum, then refine with the clipped centre of
    /// intensity.
    ///
    /// # Errors
    /// Returns an index error when the seed's channel or time does not exist.
    pub fn localize(&self, seed: &APoint) -> Result<APoint> {
        let mut point = seed.clone();
        constrain_point(&mut point, self.volumes.sizes());
        if self.config.iterate_max {
            point = self.iterative_closest_max(&point)?;
        }
        self.clipped_coi(&mut point, self.config.use_coi)?;
        Ok(point)
    }
}

/// Localize a marker at `position` and insert it after the active marker of
/// the active list.
///
/// # Errors
/// Returns an index error when the position's channel or time does not exist.
pub fn place_marker(
    lists: &mut MarkerLists,
    volumes: &VolumeSet,
    config: &TrackingConfig,
    position: [f64; 5],
) -> Result<APoint> {
    let active = lists.active_index();
    let point = Localizer::new(volumes, lists, config)
        .excluding(active)
        .localize(&APoint::new(position))?;
    lists.add_marker(point.clone());
    Ok(point)
}
