//! Flat per-marker rows for export and import of a whole forest.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use voxel5d_core::{Calibration, VolumeSet};

use crate::error::Result;
use crate::list::MarkerList;
use crate::lists::MarkerLists;
use crate::point::{APoint, DEFAULT_MARKER_COLOR};

/// Column names of a marker row, in file order.
pub const COLUMNS: [&str; 22] = [
    "ListNr",
    "MarkerNr",
    "PosX",
    "PosY",
    "PosZ",
    "Element",
    "Time",
    "Integral",
    "Max",
    "RealPosX",
    "RealPosY",
    "RealPosZ",
    "RealElement",
    "RealTime",
    "RealIntegral",
    "RealMax",
    "Tagged",
    "Parent",
    "Child1",
    "Child2",
    "ListColor",
    "ListName",
];

/// One marker with its list context.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerRow {
    pub list: usize,
    pub marker: usize,
    pub coords: [f64; 5],
    pub integral: f64,
    pub max: f64,
    /// Coordinates in world units of the marker's channel calibration.
    pub world: [f64; 5],
    pub integral_calibrated: f64,
    pub max_calibrated: f64,
    pub tagged: bool,
    pub parent: Option<usize>,
    pub children: [Option<usize>; 2],
    pub color: u32,
    pub name: String,
}

impl MarkerRow {
    /// A row with default values for every column but the indices and coordinates.
    #[must_use]
    pub fn new(list: usize, marker: usize, coords: [f64; 5]) -> Self {
        Self {
            list,
            marker,
            coords,
            integral: 0.0,
            max: 0.0,
            world: coords,
            integral_calibrated: 0.0,
            max_calibrated: 0.0,
            tagged: false,
            parent: None,
            children: [None; 2],
            color: DEFAULT_MARKER_COLOR,
            name: String::new(),
        }
    }
}

/// What an import changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub rows: usize,
    pub markers_added: usize,
    pub markers_updated: usize,
    /// Rows whose marker index skipped past the end of their list.
    pub rejected: usize,
    /// Pre-existing lists replaced by an imported list of the same name.
    pub duplicates_removed: usize,
}

/// Calibration of every channel, taken from the first time point.
#[must_use]
pub fn channel_calibrations(volumes: &VolumeSet) -> Vec<Calibration> {
    (0..volumes.channels())
        .filter_map(|c| volumes.volume(c, 0).ok())
        .map(|v| v.calibration().clone())
        .collect()
}

/// Append channels and time points until every row's channel and time exist.
///
/// # Errors
/// Returns allocation errors from the volume set.
pub fn grow_volumes_for(rows: &[MarkerRow], volumes: &mut VolumeSet) -> Result<()> {
    let point_of = |r: &MarkerRow| APoint::new(r.coords);
    let channels = rows.iter().map(|r| point_of(r).channel() + 1).max().unwrap_or(0);
    let times = rows.iter().map(|r| point_of(r).time() + 1).max().unwrap_or(0);
    if volumes.channels() < channels {
        let template = volumes.volume(0, 0)?;
        let (kind, calibration) = (template.kind(), template.calibration().clone());
        while volumes.channels() < channels {
            volumes.push_channel(kind, &calibration)?;
        }
    }
    while volumes.times() < times {
        volumes.generate_new_timepoint()?;
    }
    Ok(())
}

impl MarkerLists {
    /// One row per marker, lists in arena order.
    ///
    /// World columns use `calibrations[channel]`, falling back to the first
    /// entry and then to the identity calibration.
    #[must_use]
    pub fn export_rows(&self, calibrations: &[Calibration]) -> Vec<MarkerRow> {
        let identity = Calibration::default();
        let mut rows = Vec::with_capacity(self.total_markers());
        for (li, list) in self.lists.iter().enumerate() {
            for (mi, p) in list.points().iter().enumerate() {
                let cal = calibrations
                    .get(p.channel())
                    .or_else(|| calibrations.first())
                    .unwrap_or(&identity);
                rows.push(MarkerRow {
                    list: li,
                    marker: mi,
                    coords: p.coords,
                    integral: p.integral,
                    max: p.max,
                    world: std::array::from_fn(|d| cal.to_world(d, p.coords[d])),
                    integral_calibrated: cal.calibrate(p.integral),
                    max_calibrated: cal.calibrate(p.max),
                    tagged: p.tagged,
                    parent: list.parent(),
                    children: list.children(),
                    color: list.color(),
                    name: list.name.clone(),
                });
            }
        }
        rows
    }

    fn ensure_list(&mut self, index: usize) {
        while self.lists.len() <= index {
            let name = self.next_name.to_string();
            self.next_name += 1;
            self.lists.push(MarkerList::new(name));
        }
    }

    /// Import rows as new lists appended after the existing ones.
    ///
    /// List indices in the rows are relative to the import; an index past
    /// the current end appends exactly one list. A marker index equal to the
    /// list length appends, a smaller one updates that marker, a larger one is
    /// rejected. Afterwards every pre-existing list whose name reappears among
    /// the imported lists is removed. A forest holding only one empty list is
    /// replaced entirely, so exporting and re-importing reproduces the indices.
    pub fn import_rows(&mut self, rows: &[MarkerRow]) -> ImportReport {
        let mut report = ImportReport {
            rows: rows.len(),
            ..ImportReport::default()
        };
        if rows.is_empty() {
            return report;
        }
        if self.lists.len() == 1 && self.lists[0].is_empty() {
            self.lists.clear();
            self.active = 0;
        }
        let offset = self.lists.len();

        for row in rows {
            let li = (row.list + offset).min(self.lists.len());
            self.ensure_list(li);
            let parent = row.parent.map(|p| p + offset);
            let children = row.children.map(|c| c.map(|c| c + offset));
            for link in parent.iter().chain(children.iter().flatten()) {
                self.ensure_list(*link);
            }

            let list = &mut self.lists[li];
            list.parent = parent;
            list.children = children;
            if !row.name.is_empty() {
                list.name.clone_from(&row.name);
            }
            if list.color != row.color {
                list.paint(row.color);
            }

            let count = list.len();
            if row.marker > count {
                log::warn!(
                    "rejected marker row {}/{}: list {} holds {count} marker(s)",
                    row.list,
                    row.marker,
                    list.name
                );
                report.rejected += 1;
                continue;
            }
            let mut point = list.points.get(row.marker).cloned().unwrap_or_default();
            point.coords = row.coords;
            point.integral = row.integral;
            point.max = row.max;
            point.tagged = row.tagged;
            point.color = row.color;
            if row.marker == count {
                list.points.push(point);
                report.markers_added += 1;
            } else {
                list.points[row.marker] = point;
                report.markers_updated += 1;
            }
        }

        let mut existing = offset;
        let mut i = 0;
        while i < existing {
            let name = &self.lists[i].name;
            if self.lists[existing..].iter().any(|l| &l.name == name) && self.remove_list(i).is_ok() {
                existing -= 1;
                report.duplicates_removed += 1;
            } else {
                i += 1;
            }
        }

        for list in &mut self.lists {
            if let Ok(n) = list.name.parse::<usize>() {
                self.next_name = self.next_name.max(n + 1);
            }
            list.active = 0;
        }
        self.active = self.lists.len() - 1;
        log::info!(
            "imported {} row(s): {} added, {} updated, {} rejected, {} duplicate list(s) removed",
            report.rows,
            report.markers_added,
            report.markers_updated,
            report.rejected,
            report.duplicates_removed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voxel5d_core::{ValueKind, VoxelVolume};

    fn forest() -> MarkerLists {
        let mut lists = MarkerLists::new();
        lists.add_marker(APoint::new([1.0, 2.0, 3.0, 0.0, 0.0]));
        lists.add_marker(APoint::new([1.5, 2.0, 3.0, 0.0, 1.0]));
        lists.active_list_mut().active_point_mut().unwrap().tagged = true;
        lists.new_child(0).unwrap();
        lists.add_marker(APoint::new([4.0, 4.0, 0.0, 1.0, 2.0]));
        lists
    }

    #[test]
    fn test_export_world_columns() {
        let lists = forest();
        let cal = vec![
            Calibration::default().with_axis(0, 0.5, 10.0).with_value(2.0, 1.0),
            Calibration::default().with_axis(0, 3.0, 0.0),
        ];
        let rows = lists.export_rows(&cal);
        assert_eq!(rows.len(), 3);
        assert_relative_eq!(rows[0].world[0], 10.5);
        assert_relative_eq!(rows[2].world[0], 12.0);
        assert_eq!(rows[2].parent, Some(0));
        assert_eq!(rows[0].children, [Some(1), None]);
        assert_eq!(rows[2].name, "1a");
        assert!(rows[1].tagged);
        assert_relative_eq!(rows[0].integral_calibrated, 1.0);
    }

    #[test]
    fn test_roundtrip_into_fresh_forest() {
        let lists = forest();
        let rows = lists.export_rows(&[]);
        let mut fresh = MarkerLists::new();
        let report = fresh.import_rows(&rows);
        assert_eq!(report.markers_added, 3);
        assert_eq!(fresh.export_rows(&[]), rows);
    }

    #[test]
    fn test_import_updates_rejects_and_replaces() {
        let mut lists = forest();
        let mut rows = vec![
            MarkerRow::new(0, 0, [9.0, 9.0, 0.0, 0.0, 0.0]),
            MarkerRow::new(0, 0, [8.0, 8.0, 0.0, 0.0, 0.0]),
            MarkerRow::new(0, 3, [7.0, 7.0, 0.0, 0.0, 0.0]),
        ];
        for r in &mut rows {
            r.name = "1".into();
        }
        let report = lists.import_rows(&rows);
        assert_eq!(report.markers_added, 1);
        assert_eq!(report.markers_updated, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists.list(0).unwrap().name, "1a");
        assert_eq!(lists.list(0).unwrap().parent(), None);
        let imported = lists.list(1).unwrap();
        assert_eq!(imported.name, "1");
        assert_eq!(imported.points()[0].coords[0], 8.0);
    }

    #[test]
    fn test_grow_volumes_for_rows() {
        let mut set = VolumeSet::new(VoxelVolume::new(ValueKind::U16, [2, 2, 2]).unwrap());
        let rows = vec![MarkerRow::new(0, 0, [0.0, 0.0, 0.0, 2.0, 3.0])];
        grow_volumes_for(&rows, &mut set).unwrap();
        assert_eq!(set.channels(), 3);
        assert_eq!(set.times(), 4);
        assert_eq!(set.volume(2, 3).unwrap().kind(), ValueKind::U16);
        assert_eq!(channel_calibrations(&set).len(), 3);
    }
}
