//! Joint histograms of up to three channels and masks drawn in histogram space.
#![allow(clippy::cast_precision_loss)]

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::gate::Gate;
use crate::kind::ValueKind;
use crate::roi::Roi;
use crate::util::{f64_to_index_clamped, usize_to_f64, usize_to_i64};
use crate::volume::VoxelVolume;

/// Counts of calibrated value tuples, binned linearly between each channel's
/// observed calibrated min and max.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram3D {
    bins: [usize; 3],
    ranges: [(f64, f64); 3],
    counts: Vec<u64>,
    dims: usize,
}

impl Histogram3D {
    /// Accumulate the joint histogram of `volumes` (one to three channels of equal shape).
    ///
    /// Only voxels inside `roi` (in the first channel's registered frame) and
    /// admitted by `gate` are counted. Further channels are read
    /// registration-corrected relative to the first.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for zero or more than three channels or
    /// zero bins, and [`Error::ShapeMismatch`] when shapes differ.
    pub fn compute(
        volumes: &[&VoxelVolume],
        bins: [usize; 3],
        roi: &Roi,
        gate: &Gate<'_>,
    ) -> Result<Self> {
        let dims = validate(volumes)?;
        let mut bins = bins;
        for (d, b) in bins.iter_mut().enumerate() {
            if d >= dims {
                *b = 1;
            } else if *b == 0 {
                return Err(Error::ConfigError("histogram needs at least one bin".into()));
            }
        }

        let mut ranges = [(0.0, 0.0); 3];
        for (d, range) in ranges.iter_mut().enumerate().take(dims) {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            let reference = volumes[0].display_offset();
            volumes[0].for_each_admitted(roi, gate, |x, y, z| {
                let v = sample(volumes, d, x, y, z, reference);
                lo = lo.min(v);
                hi = hi.max(v);
            });
            *range = if lo <= hi { (lo, hi) } else { (0.0, 0.0) };
        }

        let total = bins[0] * bins[1] * bins[2];
        let first = volumes[0];
        let [sx, sy, sz] = first.shape();
        let offset = first.display_offset();
        let counts = (0..sz)
            .into_par_iter()
            .map(|z| {
                let mut local = vec![0u64; total];
                for y in 0..sy {
                    for x in 0..sx {
                        let (xi, yi, zi) = (usize_to_i64(x), usize_to_i64(y), usize_to_i64(z));
                        if !roi.in_range(xi + offset[0], yi + offset[1], zi + offset[2])
                            || !gate.admits(xi, yi, zi, offset)
                        {
                            continue;
                        }
                        let idx = bin_index(volumes, &bins, &ranges, dims, x, y, z, offset);
                        local[idx[0] + bins[0] * (idx[1] + bins[1] * idx[2])] += 1;
                    }
                }
                local
            })
            .reduce(
                || vec![0u64; total],
                |mut a, b| {
                    for (acc, v) in a.iter_mut().zip(b) {
                        *acc += v;
                    }
                    a
                },
            );

        log::debug!("histogram over {dims} channel(s), bins {bins:?}, ranges {ranges:?}");
        Ok(Self {
            bins,
            ranges,
            counts,
            dims,
        })
    }

    /// Bins per dimension (unused dimensions report 1).
    #[must_use]
    pub fn bins(&self) -> [usize; 3] {
        self.bins
    }

    /// Calibrated `(min, max)` covered by each dimension.
    #[must_use]
    pub fn ranges(&self) -> [(f64, f64); 3] {
        self.ranges
    }

    /// Number of channels binned.
    #[must_use]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Count in bin `(i, j, k)`; 0 outside the histogram.
    #[must_use]
    pub fn count(&self, i: usize, j: usize, k: usize) -> u64 {
        if i >= self.bins[0] || j >= self.bins[1] || k >= self.bins[2] {
            return 0;
        }
        self.counts[i + self.bins[0] * (j + self.bins[1] * k)]
    }

    /// Total number of counted voxels.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Largest bin count.
    #[must_use]
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Bin of a calibrated value along dimension `d`.
    #[must_use]
    pub fn bin_of(&self, d: usize, value: f64) -> usize {
        bin(value, self.ranges[d], self.bins[d])
    }

    /// Derive a U8 mask marking voxels whose bin coordinates lie inside
    /// `selection` (a ROI drawn over bin indices).
    ///
    /// # Errors
    /// Returns the same errors as [`Histogram3D::compute`] for invalid channel
    /// sets and [`Error::ResourceExhausted`] when the mask cannot be allocated.
    pub fn mask(&self, volumes: &[&VoxelVolume], selection: &Roi) -> Result<VoxelVolume> {
        let dims = validate(volumes)?;
        if dims != self.dims {
            return Err(Error::ConfigError(format!(
                "histogram has {} channel(s), got {dims}",
                self.dims
            )));
        }
        let first = volumes[0];
        let offset = first.display_offset();
        let mut mask = VoxelVolume::new(ValueKind::U8, first.shape())?;
        mask.set_calibration(first.calibration().clone().with_value(1.0, 0.0));
        mask.set_display_offset(offset);
        mask.set_display_window(0.0, 1.0, crate::lut::TABLE_SIZE);
        let [sx, sy, sz] = first.shape();
        for z in 0..sz {
            for y in 0..sy {
                for x in 0..sx {
                    let idx =
                        bin_index(volumes, &self.bins, &self.ranges, dims, x, y, z, offset);
                    if selection.in_range(
                        usize_to_i64(idx[0]),
                        usize_to_i64(idx[1]),
                        usize_to_i64(idx[2]),
                    ) {
                        mask.set_raw(x, y, z, 1.0);
                    }
                }
            }
        }
        mask.recompute_min_max();
        Ok(mask)
    }
}

fn validate(volumes: &[&VoxelVolume]) -> Result<usize> {
    if volumes.is_empty() || volumes.len() > 3 {
        return Err(Error::ConfigError(format!(
            "histogram needs one to three channels, got {}",
            volumes.len()
        )));
    }
    let shape = volumes[0].shape();
    for v in &volumes[1..] {
        if v.shape() != shape {
            return Err(Error::ShapeMismatch {
                expected: shape,
                found: v.shape(),
            });
        }
    }
    Ok(volumes.len())
}

#[inline]
fn sample(volumes: &[&VoxelVolume], d: usize, x: usize, y: usize, z: usize, reference: [i64; 3]) -> f64 {
    if d == 0 {
        volumes[0].get_calibrated(x, y, z)
    } else {
        volumes[d].value_at_offset(usize_to_i64(x), usize_to_i64(y), usize_to_i64(z), reference)
    }
}

#[inline]
fn bin(value: f64, range: (f64, f64), bins: usize) -> usize {
    let (lo, hi) = range;
    if hi > lo {
        f64_to_index_clamped((value - lo) / (hi - lo) * usize_to_f64(bins), bins)
    } else {
        0
    }
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn bin_index(
    volumes: &[&VoxelVolume],
    bins: &[usize; 3],
    ranges: &[(f64, f64); 3],
    dims: usize,
    x: usize,
    y: usize,
    z: usize,
    reference: [i64; 3],
) -> [usize; 3] {
    let mut idx = [0usize; 3];
    for d in 0..dims {
        idx[d] = bin(sample(volumes, d, x, y, z, reference), ranges[d], bins[d]);
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (VoxelVolume, VoxelVolume) {
        let a = VoxelVolume::from_vec([4, 1, 1], vec![0u8, 10, 10, 20]).unwrap();
        let b = VoxelVolume::from_vec([4, 1, 1], vec![5u8, 5, 6, 6]).unwrap();
        (a, b)
    }

    #[test]
    fn test_single_channel_counts() {
        let (a, _) = pair();
        let h = Histogram3D::compute(&[&a], [2, 7, 7], &Roi::Unconstrained, &Gate::Open).unwrap();
        assert_eq!(h.bins(), [2, 1, 1]);
        assert_eq!(h.count(0, 0, 0), 1);
        assert_eq!(h.count(1, 0, 0), 3);
        assert_eq!(h.total(), 4);
        assert_eq!(h.max_count(), 3);
    }

    #[test]
    fn test_joint_histogram_and_mask() {
        let (a, b) = pair();
        let h = Histogram3D::compute(&[&a, &b], [3, 2, 1], &Roi::Unconstrained, &Gate::Open)
            .unwrap();
        assert_eq!(h.total(), 4);
        assert_eq!(h.count(0, 0, 0), 1);
        assert_eq!(h.count(1, 0, 0), 1);
        assert_eq!(h.count(1, 1, 0), 1);
        assert_eq!(h.count(2, 1, 0), 1);

        let selection = Roi::Box {
            min: [1, 0, 0],
            max: [2, 0, 0],
        };
        let mask = h.mask(&[&a, &b], &selection).unwrap();
        assert!((mask.get_raw(1, 0, 0) - 1.0).abs() < f64::EPSILON);
        assert!(mask.get_raw(0, 0, 0).abs() < f64::EPSILON);
        assert!(mask.get_raw(2, 0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_roi_and_gate_restrict() {
        let (a, b) = pair();
        let roi = Roi::Box {
            min: [1, 0, 0],
            max: [3, 0, 0],
        };
        let mut g = VoxelVolume::new(ValueKind::U8, [4, 1, 1]).unwrap();
        g.set_raw(3, 0, 0, 1.0);
        g.set_raw(1, 0, 0, 1.0);
        let h = Histogram3D::compute(&[&a, &b], [2, 2, 1], &roi, &Gate::Volume(&g)).unwrap();
        assert_eq!(h.total(), 2);
        assert_eq!(h.ranges()[0], (10.0, 20.0));
    }

    #[test]
    fn test_invalid_channel_sets() {
        let (a, _) = pair();
        let c = VoxelVolume::new(ValueKind::U8, [2, 2, 2]).unwrap();
        assert!(Histogram3D::compute(&[], [1, 1, 1], &Roi::Unconstrained, &Gate::Open).is_err());
        assert!(matches!(
            Histogram3D::compute(&[&a, &c], [1, 1, 1], &Roi::Unconstrained, &Gate::Open),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
