//! The marker list arena: naming, lineage links and navigation.
//!
//! Lists live in an index-addressed `Vec`. Removing a list shifts every
//! higher index down by one and rewrites the parent/child links accordingly;
//! indices held outside the arena become stale. The lineage is a binary tree
//! by convention only, so every walk is bounded by a depth limit and reports
//! [`TrackingError::MalformedLineage`] when the links loop.

use voxel5d_core::util::round_to_i64;

use crate::error::{Result, TrackingError};
use crate::list::MarkerList;
use crate::point::APoint;

/// Default depth bound of lineage walks.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Forest of marker lists with one active list.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLists {
    pub(crate) lists: Vec<MarkerList>,
    pub(crate) active: usize,
    pub(crate) next_name: usize,
    pub(crate) max_depth: usize,
}

impl Default for MarkerLists {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerLists {
    /// Creates a forest holding one empty list named `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lists: vec![MarkerList::new("1")],
            active: 0,
            next_name: 2,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the depth bound of lineage walks.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Change the depth bound of lineage walks.
    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth.max(1);
    }

    /// Number of lists (never zero).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Always false: the forest keeps at least one list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Total number of markers over all lists.
    #[must_use]
    pub fn total_markers(&self) -> usize {
        self.lists.iter().map(MarkerList::len).sum()
    }

    #[must_use]
    pub fn lists(&self) -> &[MarkerList] {
        &self.lists
    }

    pub(crate) fn check(&self, index: usize) -> Result<()> {
        if index < self.lists.len() {
            Ok(())
        } else {
            Err(TrackingError::ListIndex {
                index,
                count: self.lists.len(),
            })
        }
    }

    /// List at `index`.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn list(&self, index: usize) -> Result<&MarkerList> {
        self.check(index)?;
        Ok(&self.lists[index])
    }

    /// Mutable list at `index`.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn list_mut(&mut self, index: usize) -> Result<&mut MarkerList> {
        self.check(index)?;
        Ok(&mut self.lists[index])
    }

    #[must_use]
    pub fn active_index(&self) -> usize {
        self.active
    }

    #[must_use]
    pub fn active_list(&self) -> &MarkerList {
        &self.lists[self.active]
    }

    pub fn active_list_mut(&mut self) -> &mut MarkerList {
        &mut self.lists[self.active]
    }

    /// Active marker of the active list.
    #[must_use]
    pub fn active_point(&self) -> Option<&APoint> {
        self.active_list().active_point()
    }

    /// Make list `index` active.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn set_active_list(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.active = index;
        Ok(())
    }

    /// Insert a marker after the active marker of the active list.
    pub fn add_marker(&mut self, point: APoint) {
        self.active_list_mut().insert_after_active(point);
    }

    /// Remove the active marker of the active list.
    pub fn remove_active_marker(&mut self) -> Option<APoint> {
        let list = self.active_list_mut();
        let index = list.active_index();
        list.remove(index)
    }

    fn insert_list(&mut self, at: usize, list: MarkerList) {
        for l in &mut self.lists {
            shift_links(l, |r| if r >= at { Some(r + 1) } else { Some(r) });
        }
        self.lists.insert(at, list);
    }

    fn take_name(&mut self) -> String {
        let name = self.next_name.to_string();
        self.next_name += 1;
        name
    }

    /// Insert a new empty list after the active one and make it active.
    ///
    /// Lists are named by an increasing number.
    pub fn new_list(&mut self) -> usize {
        let at = self.active + 1;
        let name = self.take_name();
        self.insert_list(at, MarkerList::new(name));
        self.active = at;
        log::debug!("new marker list {} at index {at}", self.lists[at].name);
        at
    }

    /// Attach a new list to the first free child slot of `parent`.
    ///
    /// The child is named after its parent plus `a` or `b`, takes the parent's
    /// colour and becomes active. Returns `None` when both slots are taken.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing parent.
    pub fn new_child(&mut self, parent: usize) -> Result<Option<usize>> {
        self.check(parent)?;
        let Some(slot) = self.lists[parent].children.iter().position(Option::is_none) else {
            return Ok(None);
        };
        let suffix = if slot == 0 { "a" } else { "b" };
        let mut child = MarkerList::new(format!("{}{suffix}", self.lists[parent].name));
        child.color = self.lists[parent].color;

        let at = self.active + 1;
        self.insert_list(at, child);
        let parent = if parent >= at { parent + 1 } else { parent };
        self.lists[at].parent = Some(parent);
        self.lists[parent].children[slot] = Some(at);
        self.active = at;
        Ok(Some(at))
    }

    /// Remove list `index`, unlinking it from its parent and children.
    ///
    /// Removing the last list leaves a fresh empty one behind.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn remove_list(&mut self, index: usize) -> Result<MarkerList> {
        self.check(index)?;
        Ok(self.detach(index))
    }

    fn detach(&mut self, index: usize) -> MarkerList {
        for l in &mut self.lists {
            shift_links(l, |r| match r.cmp(&index) {
                std::cmp::Ordering::Less => Some(r),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(r - 1),
            });
        }
        let removed = self.lists.remove(index);
        if self.lists.is_empty() {
            let name = self.take_name();
            self.lists.push(MarkerList::new(name));
        }
        if self.active > index {
            self.active -= 1;
        }
        self.active = self.active.min(self.lists.len() - 1);
        log::debug!("removed marker list {}", removed.name);
        removed
    }

    /// Child that forward navigation follows from `list`.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn preferred_child(&self, list: usize) -> Result<Option<usize>> {
        let l = self.list(list)?;
        Ok(l.children[l.preferred_child].or(l.children[0]).or(l.children[1]))
    }

    /// Walk up the parents to the root of `list`, marking every visited
    /// parent's preferred child so that forward navigation retraces the path.
    ///
    /// # Errors
    /// Returns [`TrackingError::MalformedLineage`] when the walk exceeds the depth bound.
    pub fn first_ancestor(&mut self, list: usize) -> Result<usize> {
        self.check(list)?;
        let mut current = list;
        for _ in 0..self.max_depth {
            let Some(parent) = self.lists[current].parent else {
                return Ok(current);
            };
            if let Some(slot) = self.lists[parent]
                .children
                .iter()
                .position(|c| *c == Some(current))
            {
                self.lists[parent].preferred_child = slot;
            }
            current = parent;
        }
        log::warn!("lineage walk from list {list} exceeded depth {}", self.max_depth);
        Err(TrackingError::MalformedLineage {
            start: list,
            depth: self.max_depth,
        })
    }

    /// Root of `list` without touching the navigation state.
    ///
    /// # Errors
    /// Returns [`TrackingError::MalformedLineage`] when the walk exceeds the depth bound.
    pub fn root_of(&self, list: usize) -> Result<usize> {
        self.check(list)?;
        let mut current = list;
        for _ in 0..self.max_depth {
            match self.lists[current].parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        log::warn!("lineage walk from list {list} exceeded depth {}", self.max_depth);
        Err(TrackingError::MalformedLineage {
            start: list,
            depth: self.max_depth,
        })
    }

    /// Whether two lists belong to the same lineage tree.
    ///
    /// # Errors
    /// Returns the errors of [`MarkerLists::root_of`].
    pub fn common_root(&self, a: usize, b: usize) -> Result<bool> {
        Ok(self.root_of(a)? == self.root_of(b)?)
    }

    /// Lists visited when following preferred children down from `start`.
    ///
    /// # Errors
    /// Returns [`TrackingError::MalformedLineage`] when the chain exceeds the depth bound.
    pub fn preferred_chain(&self, start: usize) -> Result<Vec<usize>> {
        self.check(start)?;
        let mut chain = vec![start];
        let mut current = start;
        while let Some(next) = self.preferred_child(current)? {
            if chain.len() >= self.max_depth {
                log::warn!("lineage walk from list {start} exceeded depth {}", self.max_depth);
                return Err(TrackingError::MalformedLineage {
                    start,
                    depth: self.max_depth,
                });
            }
            chain.push(next);
            current = next;
        }
        Ok(chain)
    }

    /// Colour `list` and, transitively, its parent and children.
    ///
    /// Each list is painted once, so looping links terminate.
    ///
    /// # Errors
    /// Returns [`TrackingError::ListIndex`] for a missing list.
    pub fn set_list_color(&mut self, list: usize, color: u32) -> Result<()> {
        self.check(list)?;
        let mut visited = vec![false; self.lists.len()];
        let mut pending = vec![list];
        while let Some(i) = pending.pop() {
            if i >= visited.len() || visited[i] {
                continue;
            }
            visited[i] = true;
            self.lists[i].paint(color);
            let l = &self.lists[i];
            pending.extend(l.parent.iter().chain(l.children.iter().flatten()));
        }
        Ok(())
    }

    /// Step the active marker by `delta`.
    ///
    /// Stepping past the end continues at the first marker of the preferred
    /// child; stepping before the start continues at the last marker of the
    /// parent, which then prefers the list just left. Returns false when the
    /// cursor could not move at all.
    pub fn advance_point(&mut self, delta: i64) -> bool {
        let mut moved = false;
        for _ in 0..delta.unsigned_abs() {
            let step = if delta > 0 {
                self.step_forward()
            } else {
                self.step_backward()
            };
            if !step {
                break;
            }
            moved = true;
        }
        moved
    }

    fn step_forward(&mut self) -> bool {
        let list = &mut self.lists[self.active];
        if list.active + 1 < list.len() {
            list.active += 1;
            return true;
        }
        match self.preferred_child(self.active) {
            Ok(Some(child)) => {
                self.active = child;
                self.lists[child].active = 0;
                true
            }
            _ => false,
        }
    }

    fn step_backward(&mut self) -> bool {
        let current = self.active;
        let list = &mut self.lists[current];
        if list.active > 0 {
            list.active -= 1;
            return true;
        }
        let Some(parent) = list.parent else {
            return false;
        };
        let p = &mut self.lists[parent];
        if let Some(slot) = p.children.iter().position(|c| *c == Some(current)) {
            p.preferred_child = slot;
        }
        p.active = p.len().saturating_sub(1);
        self.active = parent;
        true
    }

    /// Cycle the active list by `delta`.
    ///
    /// An empty active list is removed first when other lists exist. The new
    /// list's cursor moves to the marker closest to the previous active marker
    /// along `axis`.
    pub fn advance_list(&mut self, delta: i64, axis: usize) {
        let reference = self.active_point().map(|p| p.coords[axis.min(4)]);
        let mut delta = delta;
        if self.lists.len() > 1 && self.active_list().is_empty() {
            self.detach(self.active);
            if delta > 0 {
                delta -= 1;
            }
        }
        let len = i64::try_from(self.lists.len()).unwrap_or(i64::MAX);
        let current = i64::try_from(self.active).unwrap_or(0);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let next = (current + delta).rem_euclid(len) as usize;
        self.active = next;
        if let Some(position) = reference {
            if let Some(i) = self.lists[next].closest_along(axis.min(4), position) {
                self.lists[next].active = i;
            }
        }
    }

    /// First marker on the displayed plane within `tolerance` of `position`.
    ///
    /// `position` is the 5D cursor; markers qualify when they share its slice
    /// along `axis` and its time point, and lie within the tolerance on the
    /// two in-plane axes. Returns `(list, marker)`.
    #[must_use]
    pub fn marker_near(&self, position: [f64; 5], tolerance: [f64; 2], axis: usize) -> Option<(usize, usize)> {
        let (u, v) = voxel5d_core::plane_axes(axis);
        let axis = axis.min(2);
        let slice = round_to_i64(position[axis]);
        let time = round_to_i64(position[4]);
        self.lists.iter().enumerate().find_map(|(li, list)| {
            list.points
                .iter()
                .position(|p| {
                    round_to_i64(p.coords[axis]) == slice
                        && round_to_i64(p.coords[4]) == time
                        && (p.coords[u] - position[u]).abs() <= tolerance[0]
                        && (p.coords[v] - position[v]).abs() <= tolerance[1]
                })
                .map(|mi| (li, mi))
        })
    }

    /// Append one new list holding a marker at each of `positions`.
    ///
    /// Always creates exactly one list, even for no positions. Returns its index.
    pub fn import_positions(&mut self, positions: &[[f64; 5]]) -> usize {
        let index = self.new_list();
        let list = &mut self.lists[index];
        for &coords in positions {
            list.push(APoint::new(coords));
        }
        list.active = 0;
        log::info!("imported {} positions into list {}", positions.len(), list.name);
        index
    }
}

/// Rewrite the parent and child links of `list` through `map`.
pub(crate) fn shift_links(list: &mut MarkerList, map: impl Fn(usize) -> Option<usize>) {
    list.parent = list.parent.and_then(&map);
    for c in &mut list.children {
        *c = c.and_then(&map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_at(t: f64) -> APoint {
        APoint::new([1.0, 2.0, 0.0, 0.0, t])
    }

    /// Root "1" with children "1a" (two markers) and "1b" (one marker).
    fn family() -> (MarkerLists, usize, usize, usize) {
        let mut lists = MarkerLists::new();
        lists.add_marker(point_at(0.0));
        lists.add_marker(point_at(1.0));
        let a = lists.new_child(0).unwrap().unwrap();
        lists.add_marker(point_at(2.0));
        lists.add_marker(point_at(3.0));
        let b = lists.new_child(0).unwrap().unwrap();
        lists.add_marker(point_at(2.0));
        let a = if a >= b { a + 1 } else { a };
        (lists, 0, a, b)
    }

    #[test]
    fn test_new_list_names_increment() {
        let mut lists = MarkerLists::new();
        let second = lists.new_list();
        let third = lists.new_list();
        assert_eq!(lists.list(second).unwrap().name, "2");
        assert_eq!(lists.list(third).unwrap().name, "3");
        assert_eq!(lists.active_index(), third);
    }

    #[test]
    fn test_new_child_naming_and_slots() {
        let (mut lists, root, a, b) = family();
        assert_eq!(lists.list(a).unwrap().name, "1a");
        assert_eq!(lists.list(b).unwrap().name, "1b");
        assert_eq!(lists.list(root).unwrap().children(), [Some(a), Some(b)]);
        assert_eq!(lists.list(a).unwrap().parent(), Some(root));
        assert_eq!(lists.new_child(root).unwrap(), None);
    }

    #[test]
    fn test_remove_list_shifts_links() {
        let (mut lists, root, a, b) = family();
        let name_b = lists.list(b).unwrap().name.clone();
        lists.remove_list(a).unwrap();
        let b = if b > a { b - 1 } else { b };
        assert_eq!(lists.len(), 2);
        assert_eq!(lists.list(b).unwrap().name, name_b);
        assert_eq!(lists.list(root).unwrap().children(), [None, Some(b)]);
        assert_eq!(lists.list(b).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_removing_last_list_leaves_fresh_one() {
        let mut lists = MarkerLists::new();
        lists.remove_list(0).unwrap();
        assert_eq!(lists.len(), 1);
        assert!(lists.active_list().is_empty());
        assert!(lists.remove_list(3).is_err());
    }

    #[test]
    fn test_advance_point_crosses_lineage() {
        let (mut lists, root, a, b) = family();
        lists.set_active_list(root).unwrap();
        lists.list_mut(root).unwrap().set_active(0);
        assert!(lists.advance_point(2));
        assert_eq!(lists.active_index(), a);
        assert_eq!(lists.active_list().active_index(), 0);

        // step back from the start of b lands on the parent, which now prefers b
        lists.set_active_list(b).unwrap();
        lists.list_mut(b).unwrap().set_active(0);
        assert!(lists.advance_point(-1));
        assert_eq!(lists.active_index(), root);
        assert_eq!(lists.active_list().active_index(), 1);
        assert_eq!(lists.preferred_child(root).unwrap(), Some(b));
        assert!(lists.advance_point(1));
        assert_eq!(lists.active_index(), b);
        assert!(!lists.advance_point(1));
    }

    #[test]
    fn test_first_ancestor_sets_preference() {
        let (mut lists, root, a, b) = family();
        assert_eq!(lists.first_ancestor(b).unwrap(), root);
        assert_eq!(lists.preferred_child(root).unwrap(), Some(b));
        assert_eq!(lists.first_ancestor(a).unwrap(), root);
        assert_eq!(lists.preferred_chain(root).unwrap(), vec![root, a]);
        assert!(lists.common_root(a, b).unwrap());
        let other = lists.new_list();
        assert!(!lists.common_root(other, a).unwrap());
    }

    #[test]
    fn test_cyclic_links_are_bounded() {
        let mut lists = MarkerLists::new().with_max_depth(8);
        let second = lists.new_list();
        lists.lists[0].parent = Some(second);
        lists.lists[second].parent = Some(0);
        lists.lists[0].children[0] = Some(second);
        lists.lists[second].children[0] = Some(0);
        assert!(matches!(
            lists.first_ancestor(0),
            Err(TrackingError::MalformedLineage { .. })
        ));
        assert!(lists.preferred_chain(0).is_err());
        lists.set_list_color(0, 0x0012_3456).unwrap();
        assert_eq!(lists.list(second).unwrap().color(), 0x0012_3456);
    }

    #[test]
    fn test_color_propagates_through_family() {
        let (mut lists, root, a, b) = family();
        let loner = lists.new_list();
        lists.set_list_color(a, 0x00AB_CDEF).unwrap();
        for i in [root, a, b] {
            assert_eq!(lists.list(i).unwrap().color(), 0x00AB_CDEF);
        }
        assert_ne!(lists.list(loner).unwrap().color(), 0x00AB_CDEF);
    }

    #[test]
    fn test_advance_list_cycles_and_drops_empty() {
        let mut lists = MarkerLists::new();
        lists.add_marker(point_at(0.0));
        lists.add_marker(point_at(1.0));
        lists.add_marker(point_at(2.0));
        lists.list_mut(0).unwrap().set_active(1);
        let second = lists.import_positions(&[[0.0, 0.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0, 2.0]]);
        lists.set_active_list(0).unwrap();
        lists.advance_list(1, 4);
        assert_eq!(lists.active_index(), second);
        assert_eq!(lists.active_list().active_index(), 0);
        lists.advance_list(1, 4);
        assert_eq!(lists.active_index(), 0);

        lists.new_list();
        lists.advance_list(1, 4);
        assert_eq!(lists.len(), 2);
    }

    #[test]
    fn test_marker_near_on_plane() {
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([4.0, 5.0, 2.0, 0.0, 1.0]));
        assert_eq!(
            lists.marker_near([4.5, 4.0, 2.0, 0.0, 1.0], [1.0, 1.0], 2),
            Some((0, 0))
        );
        assert_eq!(lists.marker_near([4.5, 4.0, 3.0, 0.0, 1.0], [1.0, 1.0], 2), None);
        assert_eq!(lists.marker_near([4.5, 4.0, 2.0, 0.0, 0.0], [1.0, 1.0], 2), None);
        assert_eq!(lists.marker_near([9.0, 5.0, 2.0, 0.0, 1.0], [1.0, 1.0], 2), None);
    }

    #[test]
    fn test_import_positions_always_creates_one_list() {
        let mut lists = MarkerLists::new();
        let i = lists.import_positions(&[]);
        assert_eq!(lists.len(), 2);
        assert!(lists.list(i).unwrap().is_empty());
    }
}
