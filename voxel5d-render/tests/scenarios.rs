use approx::assert_relative_eq;
use voxel5d_core::{ColorModel, ColorSlot, Gate, Roi, ValueKind, VolumeSet, VoxelVolume};
use voxel5d_render::{
    composite, DisplaySession, Layer, OverlayMode, ProjectionConfig, ProjectionMode,
    SliceProjector, OPAQUE_BLACK,
};

fn single_bright_voxel() -> VoxelVolume {
    let mut v = VoxelVolume::new(ValueKind::U8, [4, 4, 4]).unwrap();
    v.set_raw(2, 2, 2, 200.0);
    v.set_display_window(0.0, 255.0, 256);
    v.recompute_min_max();
    v
}

#[test]
fn test_bright_voxel_projection_scenario() {
    let v = single_bright_voxel();
    let roi = Roi::full(v.shape());
    let bucket = u32::try_from(v.window().index(200.0)).unwrap();

    let mut mip = SliceProjector::new(2, ProjectionConfig::default()).unwrap();
    mip.compute_projection(&v, &roi, &Gate::Open);
    assert_eq!(mip.projection_index(2, 2), Some(bucket));
    let center = mip.pixel(2, 2).unwrap();
    assert!(mip.buffer().iter().all(|&i| i <= center));

    let average = ProjectionConfig::default().with_mode(ProjectionMode::Average);
    let mut avg = SliceProjector::new(2, average).unwrap();
    avg.compute_projection(&v, &roi, &Gate::Open);
    assert_relative_eq!(avg.projected_value(2, 2).unwrap(), 50.0);
}

#[test]
fn test_average_of_uniform_volume_is_uniform() {
    let values = vec![7u16; 5 * 4 * 3];
    let v = VoxelVolume::from_vec([5, 4, 3], values).unwrap();
    let rois = [
        Roi::Unconstrained,
        Roi::from_corners([1, 0, 0], [3, 2, 1]),
        Roi::OrthogonalSlabs {
            polygons: [None, None, Some(vec![(0.0, 0.0), (4.5, 0.0), (0.0, 3.5)])],
        },
    ];
    for roi in &rois {
        for axis in 0..3 {
            let config = ProjectionConfig::default().with_mode(ProjectionMode::Average);
            let mut p = SliceProjector::new(axis, config).unwrap();
            let stats = p.compute_projection(&v, roi, &Gate::Open);
            assert!(stats.voxels > 0);
            assert_relative_eq!(stats.average, 7.0);
            for vv in 0..p.height() {
                for u in 0..p.width() {
                    if p.contributing(u, vv).unwrap() > 0 {
                        assert_relative_eq!(p.projected_value(u, vv).unwrap(), 7.0);
                    }
                }
            }
        }
    }
}

#[test]
fn test_sum_composite_of_one_channel_reproduces_its_colours() {
    let v = single_bright_voxel();
    let lut = voxel5d_core::ColorLut::new(ColorModel::GlowRed, 0.0, 255.0);
    let mut p = SliceProjector::new(2, ProjectionConfig::default()).unwrap();
    let indices = p.extract_slice(&v, &Gate::Open, 2, [0; 3]).unwrap().to_vec();
    let out = composite(4, 4, &[Layer::new(&indices, &lut, OverlayMode::Sum)]).unwrap();
    for (px, &i) in out.iter().zip(&indices) {
        assert_eq!(*px, OPAQUE_BLACK | lut.packed(i as usize));
    }
}

#[test]
fn test_projection_is_idempotent_through_session() {
    let mut s = DisplaySession::new(
        VolumeSet::new(single_bright_voxel()),
        ProjectionConfig::default(),
    )
    .unwrap();
    let first = s.composite_projection(2).unwrap();
    s.invalidate_all();
    let second = s.composite_projection(2).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 16);
}

fn registered_pair() -> DisplaySession {
    let mut a = VoxelVolume::new(ValueKind::U8, [4, 4, 4]).unwrap();
    a.set_raw(1, 1, 2, 200.0);
    a.set_display_window(0.0, 255.0, 256);
    a.recompute_min_max();
    let mut b = a.clone();
    // shifted past the last column once registered
    b.set_raw(3, 1, 2, 200.0);
    b.recompute_min_max();
    let mut set = VolumeSet::from_volumes(vec![vec![a, b]]).unwrap();
    set.set_display_offset(1, 0, [1, 0, 0]).unwrap();
    let mut s = DisplaySession::new(set, ProjectionConfig::default()).unwrap();
    s.set_active_channel(0);
    s.set_overlay(0, OverlayMode::Sum, false).unwrap();
    s
}

fn assert_only_lit(image: &[u32], at: usize, color: u32) {
    assert_ne!(color, OPAQUE_BLACK);
    for (i, &px) in image.iter().enumerate() {
        let expected = if i == at { color } else { OPAQUE_BLACK };
        assert_eq!(px, expected, "pixel {i}");
    }
}

#[test]
fn test_registered_channel_in_composite() {
    let mut s = registered_pair();
    // channel 1 is shifted by +1 in x: frame x = 2 reads its storage x = 1
    let slice = s.slice(1, 2, 2).unwrap();
    assert_eq!(slice[2 + 4], 200);
    assert_eq!(slice[1 + 4], 0);
    assert_eq!(slice[4], 0);

    let image = s.composite_slice(2, 2).unwrap();
    let lit = OPAQUE_BLACK | s.channel(1).unwrap().lut().packed(200);
    assert_only_lit(&image, 2 + 4, lit);
}

#[test]
fn test_registered_channel_in_composite_projection() {
    let mut s = registered_pair();
    let image = s.composite_projection(2).unwrap();
    let display = s.channel(1).unwrap();
    // the projection buffer stays in storage coordinates
    let top = display.projector(2).unwrap().pixel(1, 1).unwrap();
    assert_eq!(display.projector(2).unwrap().pixel(3, 1), Some(top));
    assert_only_lit(&image, 2 + 4, OPAQUE_BLACK | display.lut().packed(top as usize));

    s.volumes_mut().reset_display_offsets();
    s.invalidate_all();
    let image = s.composite_projection(2).unwrap();
    assert_eq!(image[1 + 4], image[3 + 4]);
    assert_ne!(image[1 + 4], OPAQUE_BLACK);
}

#[test]
fn test_delete_channel_remaps_rgb_assignment() {
    let v = VoxelVolume::new(ValueKind::U8, [2, 2, 2]).unwrap();
    let mut set = VolumeSet::new(v);
    set.clone_channel(0).unwrap();
    set.clone_channel(0).unwrap();
    assert_eq!(set.colors(), [Some(0), Some(1), Some(2)]);
    set.delete_channel(1).unwrap();
    assert_eq!(set.color_channel(ColorSlot::Red), Some(0));
    assert_eq!(set.color_channel(ColorSlot::Green), None);
    assert_eq!(set.color_channel(ColorSlot::Blue), Some(1));
}
