use approx::assert_abs_diff_eq;
use voxel5d_core::{Calibration, ValueKind, VolumeSet, VoxelVolume};
use voxel5d_tracking::{
    autotrack, place_marker, split_at, summarize, APoint, Localizer, MarkerLists, SearchMode,
    TrackingConfig,
};

fn gaussian_bump(shape: [usize; 3], center: [f64; 3], height: f64, sign: f64) -> VoxelVolume {
    let mut v = VoxelVolume::new(ValueKind::F64, shape).unwrap();
    for z in 0..shape[2] {
        for y in 0..shape[1] {
            for x in 0..shape[0] {
                let r2 = (x as f64 - center[0]).powi(2)
                    + (y as f64 - center[1]).powi(2)
                    + (z as f64 - center[2]).powi(2);
                v.set_raw(x, y, z, sign * height * (-r2 / 6.0).exp());
            }
        }
    }
    v.recompute_min_max();
    v
}

fn converges_from_every_seed(volume: VoxelVolume, mode: SearchMode) {
    let set = VolumeSet::new(volume);
    let lists = MarkerLists::new();
    let config = TrackingConfig::default()
        .with_half_widths([2, 2, 2])
        .with_search_mode(mode);
    let localizer = Localizer::new(&set, &lists, &config);
    for dz in -2..=2 {
        for dy in -2..=2 {
            for dx in -2..=2 {
                let seed = APoint::new([
                    10.0 + f64::from(dx),
                    9.0 + f64::from(dy),
                    8.0 + f64::from(dz),
                    0.0,
                    0.0,
                ]);
                let p = localizer.localize(&seed).unwrap();
                assert_abs_diff_eq!(p.coords[0], 10.0, epsilon = 1e-6);
                assert_abs_diff_eq!(p.coords[1], 9.0, epsilon = 1e-6);
                assert_abs_diff_eq!(p.coords[2], 8.0, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_localize_converges_on_bump_max_mode() {
    converges_from_every_seed(
        gaussian_bump([20, 18, 16], [10.0, 9.0, 8.0], 200.0, 1.0),
        SearchMode::Max,
    );
}

#[test]
fn test_localize_converges_on_negated_bump_min_mode() {
    converges_from_every_seed(
        gaussian_bump([20, 18, 16], [10.0, 9.0, 8.0], 200.0, -1.0),
        SearchMode::Min,
    );
}

fn moving_spot() -> VolumeSet {
    let times = (0..6)
        .map(|t| {
            let x = 5.0 + 2.0 * f64::from(t);
            vec![gaussian_bump([24, 12, 1], [x, 6.0, 0.0], 100.0, 1.0)]
        })
        .collect();
    let mut set = VolumeSet::from_volumes(times).unwrap();
    for t in 0..6 {
        set.volume_mut(0, t)
            .unwrap()
            .set_calibration(Calibration::default().with_axis(0, 0.5, 0.0));
    }
    set
}

#[test]
fn test_track_then_summarize() {
    let set = moving_spot();
    let mut lists = MarkerLists::new();
    let config = TrackingConfig::default().with_half_widths([3, 3, 0]);
    place_marker(&mut lists, &set, &config, [5.0, 6.0, 0.0, 0.0, 0.0]).unwrap();
    let report = autotrack(&mut lists, &set, &config).unwrap();
    assert_eq!(report.created, 5);

    let summaries = summarize(&lists, 4, [0.5, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.segments, 5);
    assert_abs_diff_eq!(s.net_distance, 5.0, epsilon = 1e-6);
    assert_abs_diff_eq!(s.average_speed, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(s.directionality, 1.0, epsilon = 1e-6);
}

#[test]
fn test_split_then_roundtrip_preserves_lineage() {
    let set = moving_spot();
    let mut lists = MarkerLists::new();
    let config = TrackingConfig::default().with_half_widths([3, 3, 0]);
    place_marker(&mut lists, &set, &config, [5.0, 6.0, 0.0, 0.0, 0.0]).unwrap();
    autotrack(&mut lists, &set, &config).unwrap();
    lists.active_list_mut().set_active(3);
    lists.active_list_mut().point_mut(1).unwrap().tagged = true;

    let (a, b) = split_at(&mut lists, &set, &config, [11.0, 6.0, 0.0, 0.0, 3.0]).unwrap();
    assert_eq!(lists.list(0).unwrap().len(), 3);
    assert_eq!(lists.list(a).unwrap().len(), 3);
    assert_eq!(lists.list(b).unwrap().len(), 1);
    assert!(lists.common_root(a, b).unwrap());

    let rows = lists.export_rows(&voxel5d_tracking::channel_calibrations(&set));
    assert_abs_diff_eq!(rows[1].world[0], rows[1].coords[0] * 0.5);

    let mut fresh = MarkerLists::new();
    fresh.import_rows(&rows);
    assert_eq!(fresh.len(), lists.len());
    for (old, new) in lists.lists().iter().zip(fresh.lists()) {
        assert_eq!(old.name, new.name);
        assert_eq!(old.parent(), new.parent());
        assert_eq!(old.children(), new.children());
        assert_eq!(old.len(), new.len());
        for (p, q) in old.points().iter().zip(new.points()) {
            assert_eq!(p.coords, q.coords);
            assert_eq!(p.tagged, q.tagged);
        }
    }
}
