//! Interactive repositioning of one marker.
//!
//! A drag starts `Idle`, becomes `Dragging` on [`MarkerDrag::begin`] and
//! returns to `Idle` on commit or cancel. While dragging, the marker itself
//! follows the pointer so every view shows the candidate position.

use voxel5d_core::VolumeSet;

use crate::config::TrackingConfig;
use crate::error::{Result, TrackingError};
use crate::lists::MarkerLists;
use crate::localize::Localizer;
use crate::point::{constrain_point, APoint};

/// Observable state of a [`MarkerDrag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        list: usize,
        marker: usize,
    },
}

#[derive(Debug, Clone)]
struct Grab {
    list: usize,
    marker: usize,
    original: APoint,
}

/// Drag state machine for a single marker.
#[derive(Debug, Clone, Default)]
pub struct MarkerDrag {
    grab: Option<Grab>,
}

fn marker_mut(lists: &mut MarkerLists, list: usize, marker: usize) -> Result<&mut APoint> {
    let target = lists.list_mut(list)?;
    let count = target.len();
    target.point_mut(marker).ok_or(TrackingError::MarkerIndex {
        index: marker,
        count,
    })
}

impl MarkerDrag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> DragState {
        match &self.grab {
            None => DragState::Idle,
            Some(g) => DragState::Dragging {
                list: g.list,
                marker: g.marker,
            },
        }
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.grab.is_some()
    }

    /// Pick up `marker` of `list`. A drag already in progress is left where
    /// its marker currently sits.
    ///
    /// # Errors
    /// Returns an index error when the marker does not exist.
    pub fn begin(&mut self, lists: &mut MarkerLists, list: usize, marker: usize) -> Result<()> {
        let original = marker_mut(lists, list, marker)?.clone();
        lists.set_active_list(list)?;
        lists.active_list_mut().set_active(marker);
        self.grab = Some(Grab {
            list,
            marker,
            original,
        });
        Ok(())
    }

    /// Move the dragged marker to `position`, clamped into `sizes`.
    ///
    /// Returns `false` when no drag is in progress.
    ///
    /// # Errors
    /// Returns an index error when the dragged marker disappeared.
    pub fn move_to(
        &mut self,
        lists: &mut MarkerLists,
        sizes: [usize; 5],
        position: [f64; 5],
    ) -> Result<bool> {
        let Some(grab) = &self.grab else {
            return Ok(false);
        };
        let mut candidate = APoint::new(position);
        constrain_point(&mut candidate, sizes);
        marker_mut(lists, grab.list, grab.marker)?.coords = candidate.coords;
        Ok(true)
    }

    /// Drop the marker: localize from the candidate position and keep the
    /// result. Returns `None` when no drag is in progress.
    ///
    /// # Errors
    /// Returns index errors when the dragged marker disappeared or its
    /// channel or time point does not exist.
    pub fn commit(
        &mut self,
        lists: &mut MarkerLists,
        volumes: &VolumeSet,
        config: &TrackingConfig,
    ) -> Result<Option<APoint>> {
        let Some(grab) = self.grab.take() else {
            return Ok(None);
        };
        let seed = marker_mut(lists, grab.list, grab.marker)?.clone();
        let mut placed = Localizer::new(volumes, lists, config)
            .excluding(grab.list)
            .localize(&seed)?;
        placed.tagged = grab.original.tagged;
        placed.color = grab.original.color;
        *marker_mut(lists, grab.list, grab.marker)? = placed.clone();
        log::debug!(
            "marker {} of list {} dropped at {:?}",
            grab.marker,
            grab.list,
            placed.coords
        );
        Ok(Some(placed))
    }

    /// Abandon the drag and put the marker back. Returns `false` when no drag
    /// is in progress.
    ///
    /// # Errors
    /// Returns an index error when the dragged marker disappeared.
    pub fn cancel(&mut self, lists: &mut MarkerLists) -> Result<bool> {
        let Some(grab) = self.grab.take() else {
            return Ok(false);
        };
        *marker_mut(lists, grab.list, grab.marker)? = grab.original;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel5d_core::{ValueKind, VoxelVolume};

    fn spot_at(x: usize, y: usize) -> VolumeSet {
        let mut v = VoxelVolume::new(ValueKind::F64, [16, 16, 1]).unwrap();
        for dy in 0..3 {
            for dx in 0..3 {
                v.set_raw(x + dx - 1, y + dy - 1, 0, 10.0);
            }
        }
        v.set_raw(x, y, 0, 50.0);
        v.recompute_min_max();
        VolumeSet::new(v)
    }

    fn one_marker() -> MarkerLists {
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([2.0, 2.0, 0.0, 0.0, 0.0]));
        lists
    }

    #[test]
    fn test_cancel_restores_marker() {
        let mut lists = one_marker();
        let mut drag = MarkerDrag::new();
        drag.begin(&mut lists, 0, 0).unwrap();
        assert_eq!(drag.state(), DragState::Dragging { list: 0, marker: 0 });
        assert!(drag
            .move_to(&mut lists, [16, 16, 1, 1, 1], [40.0, 5.0, 0.0, 0.0, 0.0])
            .unwrap());
        assert_eq!(lists.list(0).unwrap().points()[0].coords[0], 15.0);
        assert!(drag.cancel(&mut lists).unwrap());
        assert_eq!(lists.list(0).unwrap().points()[0].coords[0], 2.0);
        assert_eq!(drag.state(), DragState::Idle);
    }

    #[test]
    fn test_commit_localizes_candidate() {
        let set = spot_at(9, 7);
        let mut lists = one_marker();
        lists.list_mut(0).unwrap().points[0].tagged = true;
        let config = TrackingConfig::default().with_half_widths([2, 2, 0]);
        let mut drag = MarkerDrag::new();
        drag.begin(&mut lists, 0, 0).unwrap();
        drag.move_to(&mut lists, set.sizes(), [8.0, 8.0, 0.0, 0.0, 0.0])
            .unwrap();
        let placed = drag.commit(&mut lists, &set, &config).unwrap().unwrap();
        assert!((placed.coords[0] - 9.0).abs() < 1e-9);
        assert!((placed.coords[1] - 7.0).abs() < 1e-9);
        assert!(lists.list(0).unwrap().points()[0].tagged);
        assert!(!drag.is_dragging());
    }

    #[test]
    fn test_idle_operations_are_noops() {
        let set = spot_at(5, 5);
        let mut lists = one_marker();
        let mut drag = MarkerDrag::new();
        assert!(!drag
            .move_to(&mut lists, set.sizes(), [1.0, 1.0, 0.0, 0.0, 0.0])
            .unwrap());
        assert!(drag
            .commit(&mut lists, &set, &TrackingConfig::default())
            .unwrap()
            .is_none());
        assert!(!drag.cancel(&mut lists).unwrap());
        assert!(drag.begin(&mut lists, 0, 3).is_err());
    }
}
