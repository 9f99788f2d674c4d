//! One trace: an ordered run of markers plus its lineage links.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::point::{APoint, DEFAULT_MARKER_COLOR};

/// Ordered markers of one trace.
///
/// Parent and child links are indices into the owning
/// [`MarkerLists`](crate::MarkerLists) arena.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerList {
    pub name: String,
    pub(crate) points: Vec<APoint>,
    pub(crate) active: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) children: [Option<usize>; 2],
    pub(crate) preferred_child: usize,
    pub(crate) color: u32,
}

impl MarkerList {
    /// Creates an empty list.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
            active: 0,
            parent: None,
            children: [None; 2],
            preferred_child: 0,
            color: DEFAULT_MARKER_COLOR,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[APoint] {
        &self.points
    }

    #[must_use]
    pub fn point(&self, index: usize) -> Option<&APoint> {
        self.points.get(index)
    }

    pub fn point_mut(&mut self, index: usize) -> Option<&mut APoint> {
        self.points.get_mut(index)
    }

    /// Index of the active marker.
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active
    }

    #[must_use]
    pub fn active_point(&self) -> Option<&APoint> {
        self.points.get(self.active)
    }

    pub fn active_point_mut(&mut self) -> Option<&mut APoint> {
        self.points.get_mut(self.active)
    }

    /// Make marker `index` active, clamped to the list.
    pub fn set_active(&mut self, index: usize) {
        self.active = index.min(self.points.len().saturating_sub(1));
    }

    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> [Option<usize>; 2] {
        self.children
    }

    /// Child slot (0 or 1) followed when navigating forward.
    #[must_use]
    pub fn preferred_slot(&self) -> usize {
        self.preferred_child
    }

    #[must_use]
    pub fn color(&self) -> u32 {
        self.color
    }

    /// Append a marker in the list colour and make it active.
    pub fn push(&mut self, mut point: APoint) {
        point.color = self.color;
        self.points.push(point);
        self.active = self.points.len() - 1;
    }

    /// Insert a marker after the active one and make it active.
    pub fn insert_after_active(&mut self, mut point: APoint) {
        point.color = self.color;
        let at = if self.points.is_empty() {
            0
        } else {
            self.active + 1
        };
        self.points.insert(at, point);
        self.active = at;
    }

    /// Remove marker `index`; the cursor stays on the same position when possible.
    pub fn remove(&mut self, index: usize) -> Option<APoint> {
        if index >= self.points.len() {
            return None;
        }
        let removed = self.points.remove(index);
        if self.active > index || self.active >= self.points.len() {
            self.active = self.active.saturating_sub(1);
        }
        Some(removed)
    }

    /// Drop every marker after `index`.
    pub fn truncate_after(&mut self, index: usize) {
        self.points.truncate(index + 1);
        self.set_active(self.active);
    }

    /// Index of the marker whose coordinate along `axis` is closest to `position`.
    #[must_use]
    pub fn closest_along(&self, axis: usize, position: f64) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.coords[axis] - position).abs();
                let db = (b.coords[axis] - position).abs();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)
    }

    pub(crate) fn paint(&mut self, color: u32) {
        self.color = color;
        for p in &mut self.points {
            p.color = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(n: usize) -> MarkerList {
        let mut list = MarkerList::new("1");
        for i in 0..n {
            #[allow(clippy::cast_precision_loss)]
            list.push(APoint::new([0.0, 0.0, 0.0, 0.0, i as f64]));
        }
        list
    }

    #[test]
    fn test_push_activates_last() {
        let list = list_of(3);
        assert_eq!(list.len(), 3);
        assert_eq!(list.active_index(), 2);
    }

    #[test]
    fn test_remove_keeps_cursor_valid() {
        let mut list = list_of(3);
        list.remove(2);
        assert_eq!(list.active_index(), 1);
        list.set_active(0);
        list.remove(1);
        assert_eq!(list.active_index(), 0);
        assert!(list.remove(5).is_none());
    }

    #[test]
    fn test_truncate_after() {
        let mut list = list_of(5);
        list.truncate_after(1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.active_index(), 1);
    }

    #[test]
    fn test_closest_along() {
        let list = list_of(4);
        assert_eq!(list.closest_along(4, 2.2), Some(2));
        assert_eq!(MarkerList::new("x").closest_along(4, 0.0), None);
    }

    #[test]
    fn test_paint_colours_points() {
        let mut list = list_of(2);
        list.paint(0x00FF_0000);
        assert!(list.points().iter().all(|p| p.color == 0x00FF_0000));
    }
}
