use approx::assert_abs_diff_eq;
use tempfile::tempdir;
use voxel5d_core::{Calibration, ValueKind, VolumeSet, VoxelVolume};
use voxel5d_io::{
    load_markers, save_markers, LoadConfig, MarkerTableReader, RawVolumeLoader, SettingsFile,
};
use voxel5d_render::ProjectionMode;
use voxel5d_tracking::{MarkerLists, SearchMode, TrackingConfig};

fn two_timepoints() -> VolumeSet {
    let times = (0..2)
        .map(|_| vec![VoxelVolume::new(ValueKind::U8, [8, 8, 1]).unwrap()])
        .collect();
    let mut set = VolumeSet::from_volumes(times).unwrap();
    for t in 0..2 {
        set.volume_mut(0, t)
            .unwrap()
            .set_calibration(Calibration::default().with_axis(0, 2.0, 0.0));
    }
    set
}

#[test]
fn test_marker_table_roundtrip_with_summary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("markers.txt");
    let volumes = two_timepoints();

    let mut lists = MarkerLists::new();
    lists.import_positions(&[[1.0, 2.0, 0.0, 0.0, 0.0], [4.0, 2.0, 0.0, 0.0, 1.0]]);
    assert_eq!(save_markers(&path, &lists, &volumes, 4).unwrap(), 2);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.lines().any(|l| l.starts_with("# ListNr")));

    let rows = MarkerTableReader::open(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_abs_diff_eq!(rows[1].world[0], 8.0);

    let mut fresh = MarkerLists::new();
    let mut target = two_timepoints();
    let report = load_markers(&path, &mut fresh, &mut target).unwrap();
    assert_eq!(report.markers_added, 2);
    assert_eq!(fresh.total_markers(), 2);
    assert_eq!(fresh.list(0).unwrap().points()[1].coords, [4.0, 2.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_loading_markers_grows_time_axis() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("late.txt");
    std::fs::write(&path, "0\t0\t1\t1\t0\t0\t3\n").unwrap();

    let mut lists = MarkerLists::new();
    let mut volumes = two_timepoints();
    load_markers(&path, &mut lists, &mut volumes).unwrap();
    assert_eq!(volumes.times(), 4);
}

#[test]
fn test_settings_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut settings = SettingsFile::default();
    settings.tracking = TrackingConfig::default()
        .with_search_mode(SearchMode::Min)
        .with_fwhm(3.5);
    settings.projection.mode = ProjectionMode::Average;
    settings.load = LoadConfig::default().with_memory_budget_bytes(1 << 20);
    settings.save(&path).unwrap();

    let loaded = SettingsFile::load(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_raw_volume_feeds_volume_set() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack.raw");
    let values: Vec<u8> = (0..24u16)
        .map(f32::from)
        .flat_map(f32::to_le_bytes)
        .collect();
    std::fs::write(&path, values).unwrap();

    let loader = RawVolumeLoader::open(&path).unwrap();
    let config = LoadConfig::default().with_memory_budget_bytes(4096);
    let volume = loader.load(ValueKind::F32, [4, 3, 2], &config).unwrap();
    assert_abs_diff_eq!(volume.get_raw(3, 2, 1), 23.0);
    assert_abs_diff_eq!(volume.min_raw(), 0.0);

    let set = VolumeSet::new(volume);
    assert_eq!(set.sizes(), [4, 3, 2, 1, 1]);
}
