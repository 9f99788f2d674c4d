//! Trace following along the track direction, lineage splits and the
//! operations that feed tracked markers back into the volume set.

use voxel5d_core::util::{i64_to_f64, round_to_i64, usize_to_f64};
use voxel5d_core::{Error as CoreError, VolumeSet};

use crate::config::{FinishCriterion, FinishMode, TrackingConfig};
use crate::error::{Result, TrackingError};
use crate::lists::MarkerLists;
use crate::localize::Localizer;
use crate::point::APoint;

/// Counts of what one autotrack run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoTrackReport {
    /// Existing markers re-localized.
    pub updated: usize,
    /// Markers appended past the previous end of the list.
    pub created: usize,
    /// Markers dropped by a stop.
    pub removed: usize,
    /// Whether the finish criterion ended the track.
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accept,
    Freeze,
    Stop,
}

/// Running maxima of the finish criteria along a track.
#[derive(Debug, Clone, Copy)]
struct FinishState {
    max: f64,
    integral: f64,
    above_min: f64,
}

impl FinishState {
    fn new() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            integral: f64::NEG_INFINITY,
            above_min: f64::NEG_INFINITY,
        }
    }

    fn observe(&mut self, point: &APoint) {
        self.max = self.max.max(point.max);
        self.integral = self.integral.max(point.integral);
        self.above_min = self.above_min.max(point.integral_above_min);
    }

    fn judge(&mut self, point: &APoint, config: &TrackingConfig) -> Verdict {
        self.observe(point);
        let (value, total) = match config.finish_criterion {
            FinishCriterion::Max => (point.max, self.max),
            FinishCriterion::Integral => (point.integral, self.integral),
            FinishCriterion::IntegralAboveMin => (point.integral_above_min, self.above_min),
        };
        let measure = if total > 0.0 { value / total } else { 1.0 };
        if measure >= config.finish_threshold {
            return Verdict::Accept;
        }
        match config.finish_mode {
            FinishMode::None => Verdict::Accept,
            FinishMode::Freeze => Verdict::Freeze,
            FinishMode::Stop => Verdict::Stop,
        }
    }
}

/// `previous` advanced to `track_value` along `direction`, shifted by the
/// registration difference between the two volumes when enabled.
fn step_seed(
    volumes: &VolumeSet,
    previous: &APoint,
    track_value: f64,
    config: &TrackingConfig,
) -> Result<APoint> {
    let direction = config.track_direction.min(4);
    let mut seed = previous.clone();
    seed.coords[direction] = track_value;
    if config.correct_registration {
        let before = volumes.volume(previous.channel(), previous.time())?.display_offset();
        let after = volumes.volume(seed.channel(), seed.time())?.display_offset();
        for d in 0..3 {
            if d != direction {
                seed.coords[d] -= i64_to_f64(after[d] - before[d]);
            }
        }
    }
    Ok(seed)
}

/// Place a frozen marker: the seed position itself with freshly measured intensities.
fn frozen_at(localizer: &Localizer<'_>, seed: &APoint) -> Result<APoint> {
    let mut point = seed.clone();
    localizer.clipped_coi(&mut point, false)?;
    Ok(point)
}

/// Follow the active list along the track direction.
///
/// Markers after the active one are re-localized first, each from its own
/// position. The list is then extended one step at a time until the extent
/// of the track direction ends. Every new seed is the previous marker
/// advanced by one step and corrected for registration. Markers failing the
/// finish criterion are placed at the last good position (`Freeze`) or end
/// the track (`Stop`). The tracked list never repels itself.
///
/// # Errors
/// Returns [`TrackingError::EmptyList`] when the active list holds no marker,
/// and index errors for markers outside the volume set.
pub fn autotrack(
    lists: &mut MarkerLists,
    volumes: &VolumeSet,
    config: &TrackingConfig,
) -> Result<AutoTrackReport> {
    let index = lists.active_index();
    let direction = config.track_direction.min(4);
    let extent = volumes.sizes()[direction];
    let start = lists.active_list().active_index();
    if lists.active_list().is_empty() {
        return Err(TrackingError::EmptyList(index));
    }

    let mut state = FinishState::new();
    for p in &lists.active_list().points()[..=start] {
        state.observe(p);
    }
    let mut report = AutoTrackReport::default();

    let mut i = start + 1;
    while i < lists.list(index)?.len() {
        let list = lists.list(index)?;
        let previous = list.points()[i - 1].clone();
        let existing = list.points()[i].clone();
        let localizer = Localizer::new(volumes, lists, config).excluding(index);
        let mut point = localizer.localize(&existing)?;
        if direction < 3 {
            point.coords[direction] = existing.coords[direction];
        }
        let verdict = state.judge(&point, config);
        if verdict == Verdict::Freeze {
            point = frozen_at(&localizer, &step_seed(volumes, &previous, existing.coords[direction], config)?)?;
        }
        let list = lists.list_mut(index)?;
        if verdict == Verdict::Stop {
            report.removed = list.len() - i;
            list.truncate_after(i - 1);
            report.stopped = true;
            log::debug!("track {} stopped at marker {i}", list.name);
            return Ok(report);
        }
        point.tagged = existing.tagged;
        point.color = existing.color;
        if let Some(slot) = list.point_mut(i) {
            *slot = point;
        }
        report.updated += 1;
        i += 1;
    }

    loop {
        let Some(last) = lists.list(index)?.points().last().cloned() else {
            break;
        };
        let next = round_to_i64(last.coords[direction]) + 1;
        if next < 0 || i64_to_f64(next) >= usize_to_f64(extent) {
            break;
        }
        let seed = step_seed(volumes, &last, i64_to_f64(next), config)?;
        let localizer = Localizer::new(volumes, lists, config).excluding(index);
        let mut point = localizer.localize(&seed)?;
        if direction < 3 {
            point.coords[direction] = i64_to_f64(next);
        }
        let point = match state.judge(&point, config) {
            Verdict::Accept => point,
            Verdict::Freeze => frozen_at(&localizer, &seed)?,
            Verdict::Stop => {
                report.stopped = true;
                break;
            }
        };
        lists.list_mut(index)?.push(point);
        report.created += 1;
    }

    let list = lists.list_mut(index)?;
    list.set_active(list.len().saturating_sub(1));
    log::info!(
        "autotrack of list {}: {} updated, {} created, {} removed",
        list.name,
        report.updated,
        report.created,
        report.removed
    );
    Ok(report)
}

/// Split the active list at its active marker.
///
/// Two child lists are created. The first receives every marker from the
/// active one onward, with that marker re-localized; the second receives one
/// marker localized from `position`. Children the list had before the split
/// are moved under the first new child. The second child becomes active.
/// Returns the indices of both children.
///
/// # Errors
/// Returns [`TrackingError::EmptyList`] when the active list holds no marker,
/// and index errors for positions outside the volume set.
pub fn split_at(
    lists: &mut MarkerLists,
    volumes: &VolumeSet,
    config: &TrackingConfig,
    position: [f64; 5],
) -> Result<(usize, usize)> {
    let index = lists.active_index();
    let from = lists.active_list().active_index();
    if lists.active_list().is_empty() {
        return Err(TrackingError::EmptyList(index));
    }

    let list = lists.list_mut(index)?;
    let moved = list.points.split_off(from);
    list.active = from.saturating_sub(1);
    let mut old_children = std::mem::take(&mut list.children);
    for child in old_children.iter().flatten() {
        lists.lists[*child].parent = None;
    }

    let trailing = new_child_of(lists, index, &mut old_children)?;
    let mut moved = moved.into_iter();
    if let Some(first) = moved.next() {
        let localized = Localizer::new(volumes, lists, config)
            .excluding(trailing)
            .localize(&first)?;
        let child = &mut lists.lists[trailing];
        child.push(localized);
        for p in moved {
            child.push(p);
        }
        child.active = 0;
    }

    let branch = new_child_of(lists, index, &mut old_children)?;
    let localized = Localizer::new(volumes, lists, config)
        .excluding(branch)
        .localize(&APoint::new(position))?;
    lists.lists[branch].push(localized);

    for (slot, child) in old_children.iter().enumerate() {
        if let Some(child) = *child {
            lists.lists[child].parent = Some(trailing);
            lists.lists[trailing].children[slot] = Some(child);
        }
    }
    log::debug!(
        "split list {} into {} and {}",
        lists.lists[index].name,
        lists.lists[trailing].name,
        lists.lists[branch].name
    );
    Ok((trailing, branch))
}

/// Add a child to `parent`, keeping the detached `pending` indices in step
/// with the insertion.
fn new_child_of(lists: &mut MarkerLists, parent: usize, pending: &mut [Option<usize>; 2]) -> Result<usize> {
    let child = lists.new_child(parent)?.ok_or(TrackingError::MalformedLineage {
        start: parent,
        depth: 0,
    })?;
    for p in pending.iter_mut().flatten() {
        if *p >= child {
            *p += 1;
        }
    }
    Ok(child)
}

/// Subtract the fitted Gaussian spot of every marker of `list` from its volume.
///
/// Returns the number of spots subtracted.
///
/// # Errors
/// Returns index errors for a missing list or markers outside the volume set.
pub fn subtract_tracked_spots(
    lists: &MarkerLists,
    volumes: &mut VolumeSet,
    list: usize,
    config: &TrackingConfig,
) -> Result<usize> {
    let sign = config.search_mode.sign();
    let mut count = 0;
    for point in lists.list(list)?.points() {
        let volume = volumes.volume_mut(point.channel(), point.time())?;
        let (lo, hi) = volume.clipped_box(point.spatial(), config.half_widths);
        let voxels: usize = (0..3).map(|d| hi[d] - lo[d] + 1).product();
        let calibration = volume.calibration();
        if calibration.value_scale == 0.0 {
            continue;
        }
        let calibrated = sign * point.integral;
        let raw = (calibrated - usize_to_f64(voxels) * calibration.value_offset) / calibration.value_scale;
        volume.subtract_gaussian(point.spatial(), raw, config.half_widths, config.fwhm);
        count += 1;
    }
    Ok(count)
}

/// Shift display offsets so that every marker along the active list's
/// lineage is displayed where the active marker is.
///
/// The walk starts at the root of the active list and follows preferred
/// children. With time as track direction every channel of a marker's time
/// point is shifted; with channel as track direction only the marker's own
/// volume. Returns the number of markers aligned.
///
/// # Errors
/// Returns [`CoreError::ConfigError`] for a spatial track direction,
/// [`TrackingError::EmptyList`] without an active marker, and lineage or
/// index errors from the walk.
pub fn align_offsets_to_track(
    lists: &mut MarkerLists,
    volumes: &mut VolumeSet,
    config: &TrackingConfig,
) -> Result<usize> {
    let direction = config.track_direction;
    if direction < 3 {
        return Err(CoreError::ConfigError(
            "offset alignment needs the channel or time axis as track direction".into(),
        )
        .into());
    }
    let index = lists.active_index();
    let anchor = lists.active_point().cloned().ok_or(TrackingError::EmptyList(index))?;
    let anchor_offset = volumes.volume(anchor.channel(), anchor.time())?.display_offset();
    let anchor_pos = anchor.rounded();

    lists.set_max_depth(config.max_lineage_depth);
    let root = lists.first_ancestor(index)?;
    let mut aligned = 0;
    for l in lists.preferred_chain(root)? {
        for p in lists.list(l)?.points() {
            let pos = p.rounded();
            let offset: [i64; 3] =
                std::array::from_fn(|d| anchor_offset[d] - pos[d] + anchor_pos[d]);
            if direction == 4 {
                for c in 0..volumes.channels() {
                    volumes.set_display_offset(c, p.time(), offset)?;
                }
            } else {
                volumes.set_display_offset(p.channel(), p.time(), offset)?;
            }
            aligned += 1;
        }
    }
    log::debug!("aligned display offsets to {aligned} marker(s)");
    Ok(aligned)
}

/// Reset every display offset of the set to zero.
pub fn reset_offsets(volumes: &mut VolumeSet) {
    volumes.reset_display_offsets();
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voxel5d_core::{ValueKind, VoxelVolume};

    fn spot(shape: [usize; 3], center: [f64; 2], height: f64) -> VoxelVolume {
        let mut v = VoxelVolume::new(ValueKind::F32, shape).unwrap();
        for y in 0..shape[1] {
            for x in 0..shape[0] {
                let dx = x as f64 - center[0];
                let dy = y as f64 - center[1];
                v.set_raw(x, y, 0, height * (-(dx * dx + dy * dy) / 4.0).exp());
            }
        }
        v.recompute_min_max();
        v
    }

    /// A spot drifting one voxel in x per time point, fading at t = 3.
    fn drifting() -> VolumeSet {
        let times = (0..5)
            .map(|t| {
                let height = if t >= 3 { 5.0 } else { 100.0 };
                vec![spot([20, 20, 1], [6.0 + t as f64, 8.0], height)]
            })
            .collect();
        VolumeSet::from_volumes(times).unwrap()
    }

    fn config() -> TrackingConfig {
        TrackingConfig::default().with_half_widths([2, 2, 0])
    }

    #[test]
    fn test_autotrack_follows_drift() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([6.0, 8.0, 0.0, 0.0, 0.0]));
        let report = autotrack(&mut lists, &set, &config()).unwrap();
        assert_eq!(report.created, 4);
        assert!(!report.stopped);
        let list = lists.active_list();
        assert_eq!(list.len(), 5);
        for (t, p) in list.points().iter().enumerate() {
            assert_relative_eq!(p.coords[0], 6.0 + t as f64, epsilon = 1e-6);
            assert_relative_eq!(p.coords[4], t as f64);
        }
    }

    #[test]
    fn test_autotrack_stop_ends_track() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([6.0, 8.0, 0.0, 0.0, 0.0]));
        let config = config().with_finish(FinishMode::Stop, FinishCriterion::Max, 0.5);
        let report = autotrack(&mut lists, &set, &config).unwrap();
        assert!(report.stopped);
        assert_eq!(lists.active_list().len(), 3);
    }

    #[test]
    fn test_autotrack_freeze_keeps_last_good_position() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([6.0, 8.0, 0.0, 0.0, 0.0]));
        let config = config().with_finish(FinishMode::Freeze, FinishCriterion::Max, 0.5);
        autotrack(&mut lists, &set, &config).unwrap();
        let list = lists.active_list();
        assert_eq!(list.len(), 5);
        assert_relative_eq!(list.points()[3].coords[0], 8.0, epsilon = 1e-6);
        assert_relative_eq!(list.points()[4].coords[0], 8.0, epsilon = 1e-6);
        assert_relative_eq!(list.points()[4].coords[4], 4.0);
    }

    #[test]
    fn test_autotrack_updates_existing_markers() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([6.0, 8.0, 0.0, 0.0, 0.0]));
        lists.add_marker(APoint::new([6.0, 9.0, 0.0, 0.0, 1.0]));
        lists.active_list_mut().set_active(0);
        let report = autotrack(&mut lists, &set, &config()).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 3);
        assert_relative_eq!(lists.active_list().points()[1].coords[0], 7.0, epsilon = 1e-6);
    }

    #[test]
    fn test_autotrack_corrects_registration() {
        let mut set = drifting();
        // frame 1 is shifted by +1, so its seed moves one voxel back
        set.set_display_offset(0, 1, [1, 0, 0]).unwrap();
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([6.0, 8.0, 0.0, 0.0, 0.0]));
        let config = config().with_iterate_max(false).with_coi(false);
        autotrack(&mut lists, &set, &config).unwrap();
        assert_relative_eq!(lists.active_list().points()[1].coords[0], 5.0);
    }

    #[test]
    fn test_autotrack_empty_list() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        assert_eq!(
            autotrack(&mut lists, &set, &config()),
            Err(TrackingError::EmptyList(0))
        );
    }

    #[test]
    fn test_split_moves_trailing_markers() {
        let set = drifting();
        let mut lists = MarkerLists::new();
        for t in 0..3 {
            lists.add_marker(APoint::new([6.0 + f64::from(t), 8.0, 0.0, 0.0, f64::from(t)]));
        }
        let old_child = lists.new_child(0).unwrap().unwrap();
        lists.set_active_list(0).unwrap();
        lists.active_list_mut().set_active(1);

        let (a, b) = split_at(&mut lists, &set, &config(), [7.0, 8.0, 0.0, 0.0, 1.0]).unwrap();
        let old_child = old_child + 2;
        assert_eq!(lists.list(0).unwrap().len(), 1);
        assert_eq!(lists.list(a).unwrap().len(), 2);
        assert_eq!(lists.list(b).unwrap().len(), 1);
        assert_eq!(lists.list(a).unwrap().name, "1a");
        assert_eq!(lists.list(0).unwrap().children(), [Some(a), Some(b)]);
        assert_eq!(lists.list(a).unwrap().children(), [Some(old_child), None]);
        assert_eq!(lists.list(old_child).unwrap().parent(), Some(a));
        assert_eq!(lists.active_index(), b);
        assert_relative_eq!(lists.list(a).unwrap().points()[0].coords[0], 7.0, epsilon = 1e-6);
    }

    #[test]
    fn test_subtract_tracked_spots_flattens_peak() {
        let mut set = VolumeSet::new(spot([16, 16, 1], [8.0, 8.0], 100.0));
        let mut lists = MarkerLists::new();
        let config = config();
        let located = Localizer::new(&set, &lists, &config)
            .localize(&APoint::new([8.0, 8.0, 0.0, 0.0, 0.0]))
            .unwrap();
        lists.add_marker(located);
        let before = set.volume(0, 0).unwrap().get_raw(8, 8, 0);
        assert_eq!(subtract_tracked_spots(&lists, &mut set, 0, &config).unwrap(), 1);
        let after = set.volume(0, 0).unwrap().get_raw(8, 8, 0);
        assert!(after < before / 2.0);
    }

    #[test]
    fn test_align_offsets_to_track() {
        let mut set = drifting();
        let mut lists = MarkerLists::new();
        for t in 0..3 {
            lists.add_marker(APoint::new([6.0 + f64::from(t), 8.0, 0.0, 0.0, f64::from(t)]));
        }
        lists.active_list_mut().set_active(0);
        let aligned = align_offsets_to_track(&mut lists, &mut set, &config()).unwrap();
        assert_eq!(aligned, 3);
        assert_eq!(set.volume(0, 0).unwrap().display_offset(), [0, 0, 0]);
        assert_eq!(set.volume(0, 2).unwrap().display_offset(), [-2, 0, 0]);

        reset_offsets(&mut set);
        assert_eq!(set.volume(0, 2).unwrap().display_offset(), [0, 0, 0]);

        let spatial = config().with_track_direction(2);
        assert!(align_offsets_to_track(&mut lists, &mut set, &spatial).is_err());
    }
}
