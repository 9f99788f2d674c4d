//! Trace statistics: per-list speed summary and mean square displacement.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use voxel5d_core::util::{f64_to_index_clamped, usize_to_f64};

use crate::list::MarkerList;
use crate::lists::MarkerLists;
use crate::point::APoint;

/// Scaled squared distance over the spatial axes other than `direction`.
fn spatial_sqr(a: &APoint, b: &APoint, direction: usize, scales: &[f64; 5]) -> f64 {
    (0..3)
        .filter(|&d| d != direction)
        .map(|d| {
            let delta = (a.coords[d] - b.coords[d]) * scales[d];
            delta * delta
        })
        .sum()
}

/// Motion summary of one trace along the track direction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceSummary {
    pub list: usize,
    pub name: String,
    pub markers: usize,
    /// Segments with a non-zero step along the track direction.
    pub segments: usize,
    /// Sum of the segment lengths.
    pub path_length: f64,
    /// Distance between the first and last marker.
    pub net_distance: f64,
    /// Extent of the trace along the track direction (scaled).
    pub duration: f64,
    /// `net_distance / duration`.
    pub endpoint_speed: f64,
    /// Mean of the per-segment speeds.
    pub average_speed: f64,
    /// `endpoint_speed / average_speed`; 1 for a straight run at constant speed.
    pub directionality: f64,
}

impl TraceSummary {
    /// Summarise `list`; `None` for fewer than two markers.
    ///
    /// Distances run over the spatial axes other than `direction`, each
    /// multiplied by its entry of `scales` (X, Y, Z, Channel, Time).
    #[must_use]
    pub fn from_list(index: usize, list: &MarkerList, direction: usize, scales: [f64; 5]) -> Option<Self> {
        let direction = direction.min(4);
        let points = list.points();
        let (first, last) = (points.first()?, points.last()?);
        if points.len() < 2 {
            return None;
        }
        let mut segments = 0;
        let mut path_length = 0.0;
        let mut speed_sum = 0.0;
        for pair in points.windows(2) {
            let dt = ((pair[1].coords[direction] - pair[0].coords[direction]) * scales[direction]).abs();
            if dt <= 0.0 {
                continue;
            }
            let d = spatial_sqr(&pair[0], &pair[1], direction, &scales).sqrt();
            path_length += d;
            speed_sum += d / dt;
            segments += 1;
        }
        let net_distance = spatial_sqr(first, last, direction, &scales).sqrt();
        let duration = ((last.coords[direction] - first.coords[direction]) * scales[direction]).abs();
        let endpoint_speed = if duration > 0.0 { net_distance / duration } else { 0.0 };
        let average_speed = if segments > 0 {
            speed_sum / usize_to_f64(segments)
        } else {
            0.0
        };
        let directionality = if average_speed > 0.0 {
            endpoint_speed / average_speed
        } else {
            0.0
        };
        Some(Self {
            list: index,
            name: list.name.clone(),
            markers: points.len(),
            segments,
            path_length,
            net_distance,
            duration,
            endpoint_speed,
            average_speed,
            directionality,
        })
    }
}

/// Summaries of every list with at least two markers.
#[must_use]
pub fn summarize(lists: &MarkerLists, direction: usize, scales: [f64; 5]) -> Vec<TraceSummary> {
    lists
        .lists()
        .iter()
        .enumerate()
        .filter_map(|(i, l)| TraceSummary::from_list(i, l, direction, scales))
        .collect()
}

/// Mean square displacement of `list` by step count along the track direction.
///
/// Entry `k` averages the scaled squared distance of every marker pair that
/// lies `k + 1` steps apart. The number of entries is `floor(sqrt(n + 1))`
/// for `n` markers; entries without pairs are 0.
#[must_use]
pub fn msd_from_list(list: &MarkerList, direction: usize, scales: [f64; 5]) -> Vec<f64> {
    let direction = direction.min(4);
    let points = list.points();
    let bins = f64_to_index_clamped(usize_to_f64(points.len() + 1).sqrt(), usize::MAX);
    let mut sums = vec![0.0; bins];
    let mut counts = vec![0usize; bins];
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let steps = f64_to_index_clamped((b.coords[direction] - a.coords[direction]).abs().round(), usize::MAX);
            if steps == 0 {
                continue;
            }
            if steps > bins {
                continue;
            }
            sums[steps - 1] += spatial_sqr(a, b, direction, &scales);
            counts[steps - 1] += 1;
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&s, &n)| if n > 0 { s / usize_to_f64(n) } else { 0.0 })
        .collect()
}
