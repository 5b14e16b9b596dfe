//! Volume Grid Helper Integration Tests
//!
//! Tests for:
//! - Partitioning a CT volume by byte budget and device limits
//! - Populating voxels and normals
//! - Node creation: pivot, segment placement, features per role
//! - Feature sharing between nodes and its release

use glam::{UVec3, Vec3};
use volumetra::helpers::{Dimensions, VolumeGridHelper};
use volumetra::renderer::{HeadlessDevice, RendererSettings, VolumeRenderer};
use volumetra::resources::VolumeTexture;
use volumetra::scene::{NodeHandle, Scene};
use volumetra::volume::{Hounsfield, PartitionPolicy};

const VOLUME: u32 = 2;

fn assert_vec3_near(actual: Vec3, expected: Vec3) {
    assert!(
        (actual - expected).length() < 1e-5,
        "expected {expected}, got {actual}"
    );
}

/// A 10³ volume of 4³ segments: three per axis, the last two voxels thick.
fn small_helper() -> VolumeGridHelper<u8> {
    let mut helper = VolumeGridHelper::<u8>::new(UVec3::splat(10), 64, false).unwrap();
    helper.load_intensities(|coord| coord.x as f32 / 9.0).unwrap();
    helper
}

fn segment_node(scene: &Scene, coord: UVec3) -> NodeHandle {
    scene.find_by_tag(&format!("segment {coord}")).unwrap()
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn ct_volume_is_split_by_byte_budget() {
    let helper = VolumeGridHelper::<Hounsfield>::new(UVec3::splat(300), 2 * 128 * 128 * 128, false).unwrap();
    let grid = helper.grid();

    assert_eq!(grid.segment_counts(), UVec3::splat(3));
    assert_eq!(grid.segments().len(), 27);
    assert_eq!(grid.segment_extent(), UVec3::splat(128));
    assert_eq!(grid.segment(UVec3::splat(2)).unwrap().size(), UVec3::splat(44));
    assert!(
        grid.segments()
            .all(|segment| segment.intensities().read().byte_size() <= 2 * 128 * 128 * 128)
    );
}

#[test]
fn device_limit_caps_segment_side() {
    let settings = RendererSettings {
        max_segment_bytesize: 2 * 64 * 64 * 64,
        ..RendererSettings::default()
    };
    let device = HeadlessDevice::new().with_max_texture_3d_size(16);
    let helper = VolumeGridHelper::<Hounsfield>::for_device(UVec3::splat(40), &settings, &device, false).unwrap();

    assert_eq!(helper.grid().segment_extent(), UVec3::splat(16));
    assert_eq!(helper.grid().segment_counts(), UVec3::splat(3));
}

#[test]
fn balanced_policy_evens_out_segments() {
    let resolution = UVec3::new(9, 1, 1);
    let helper = VolumeGridHelper::<u8>::new(resolution, 64, false).unwrap();
    let sizes: Vec<u32> = helper.grid().segments().map(|s| s.size().x).collect();
    assert_eq!(sizes, [4, 4, 1]);

    let helper = helper.with_policy(PartitionPolicy::Balanced).unwrap();
    let sizes: Vec<u32> = helper.grid().segments().map(|s| s.size().x).collect();
    assert_eq!(sizes, [3, 3, 3]);
    assert_eq!(helper.grid().size(), resolution);
}

#[test]
fn unlimited_budget_keeps_the_volume_whole() {
    let helper = VolumeGridHelper::<u8>::new(UVec3::splat(4), usize::MAX, false).unwrap();
    assert_eq!(helper.grid().segment_counts(), UVec3::ONE);
    assert_eq!(helper.grid().segment_extent(), UVec3::splat(4));
}

#[test]
fn budget_below_one_voxel_is_rejected() {
    assert!(VolumeGridHelper::<Hounsfield>::new(UVec3::splat(8), 1, false).is_err());
}

// ============================================================================
// Populating
// ============================================================================

#[test]
fn hounsfield_values_are_clamped_on_load() {
    let mut helper = VolumeGridHelper::<Hounsfield>::new(UVec3::splat(6), 2 * 4 * 4 * 4, false).unwrap();
    helper
        .load_hounsfield(|coord| if coord.x < 3 { -2000 } else { 500 })
        .unwrap();

    assert_eq!(helper.grid().voxel(UVec3::new(0, 5, 5)).unwrap(), Hounsfield::AIR);
    assert_eq!(helper.grid().voxel(UVec3::new(5, 0, 0)).unwrap().value(), 500);
}

#[test]
fn populate_bumps_segment_versions() {
    let mut helper = VolumeGridHelper::<u8>::new(UVec3::splat(8), 64, false).unwrap();
    let before: Vec<u64> = helper
        .grid()
        .segments()
        .map(|s| s.intensities().read().version())
        .collect();

    helper.populate(|_| 7).unwrap();

    for (segment, version) in helper.grid().segments().zip(before) {
        assert!(segment.intensities().read().version() > version);
        assert!(segment.intensities().read().as_slice().iter().all(|&v| v == 7));
    }
}

#[test]
fn normals_are_computed_with_the_data() {
    let mut helper = VolumeGridHelper::<u8>::new(UVec3::splat(8), 64, true).unwrap();
    helper.load_intensities(|coord| coord.y as f32 / 7.0).unwrap();

    let grid = helper.grid();
    assert!(grid.has_normals());
    assert_vec3_near(grid.normal(UVec3::new(3, 3, 3)).unwrap().to_vec3(), Vec3::NEG_Y);
    assert_vec3_near(grid.normal(UVec3::new(3, 3, 7)).unwrap().to_vec3(), Vec3::Z);
}

// ============================================================================
// Node Creation
// ============================================================================

#[test]
fn pivot_centers_the_volume() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let root = scene.root();
    let pivot = helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::splat(0.5)))
        .unwrap();

    let spatial = scene.get(pivot).unwrap();
    assert_eq!(spatial.tag, "volume");
    assert!(!spatial.movable);
    assert_vec3_near(spatial.transform.position, Vec3::splat(-2.5));
    assert_eq!(scene.children(pivot).len(), 27);
    assert_eq!(scene.geometries(pivot).count(), 27);
}

#[test]
fn segments_are_placed_and_scaled() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let root = scene.root();
    helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::splat(0.5)))
        .unwrap();
    scene.update_world_transforms();

    let tail = scene.get(segment_node(&scene, UVec3::new(2, 0, 0))).unwrap();
    assert!(!tail.movable);
    assert_vec3_near(tail.transform.position, Vec3::new(4.5, 1.0, 1.0));
    assert_vec3_near(tail.transform.scale, Vec3::new(1.0, 2.0, 2.0));

    // The unit proxy box of each segment ends exactly on the volume's bounds.
    let first = scene.get(segment_node(&scene, UVec3::ZERO)).unwrap();
    assert_vec3_near(first.world_matrix().transform_point3(Vec3::splat(-0.5)), Vec3::splat(-2.5));
    assert_vec3_near(tail.world_matrix().transform_point3(Vec3::new(0.5, -0.5, -0.5)), Vec3::new(2.5, -2.5, -2.5));
}

#[test]
fn extent_and_spacing_are_equivalent() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let root = scene.root();
    let by_spacing = helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::new(0.5, 1.0, 2.0)))
        .unwrap();
    let by_extent = helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Extent(Vec3::new(5.0, 10.0, 20.0)))
        .unwrap();

    let a = scene.get(by_spacing).unwrap().transform.position;
    let b = scene.get(by_extent).unwrap().transform.position;
    assert_vec3_near(a, b);
    assert_vec3_near(a, Vec3::new(-2.5, -5.0, -10.0));
}

#[test]
fn segments_carry_intensity_features() {
    let mut helper = VolumeGridHelper::<u8>::new(UVec3::splat(8), 64, true).unwrap();
    helper.load_intensities(|_| 0.5).unwrap();
    let mut scene = Scene::new();
    let root = scene.root();
    let pivot = helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::ONE))
        .unwrap();

    for (_, geometry) in scene.geometries(pivot) {
        assert_eq!(geometry.geometry_type(), VOLUME);
        assert_eq!(geometry.features_count(), 2);
        let intensities = geometry.feature(VolumeRenderer::ROLE_INTENSITIES).unwrap();
        assert!(intensities.label().ends_with("intensities"));
        assert!(intensities.downcast_ref::<VolumeTexture<u8>>().is_some());
        assert!(geometry.feature(VolumeRenderer::ROLE_NORMALS).unwrap().label().ends_with("normals"));
    }
}

#[test]
fn custom_roles_apply_to_new_nodes() {
    let mut helper = small_helper();
    helper.set_intensities_role(7);
    assert_eq!(helper.intensities_role(), 7);

    let mut scene = Scene::new();
    let root = scene.root();
    let pivot = helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::ONE))
        .unwrap();
    let (_, geometry) = scene.geometries(pivot).next().unwrap();
    assert!(geometry.has_feature(7));
    assert!(!geometry.has_feature(VolumeRenderer::ROLE_INTENSITIES));
}

// ============================================================================
// Feature Sharing
// ============================================================================

#[test]
fn nodes_share_features_until_released() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let root = scene.root();
    let spacing = Dimensions::Spacing(Vec3::ONE);
    let first = helper.create_node(&mut scene, root, VOLUME, spacing).unwrap();
    let second = helper.create_node(&mut scene, root, VOLUME, spacing).unwrap();

    helper.release_geometry_features();
    let third = helper.create_node(&mut scene, root, VOLUME, spacing).unwrap();

    let feature_of = |pivot: NodeHandle| {
        scene
            .geometries(pivot)
            .next()
            .and_then(|(_, geometry)| geometry.feature(VolumeRenderer::ROLE_INTENSITIES).cloned())
            .unwrap()
    };
    let (a, b, c) = (feature_of(first), feature_of(second), feature_of(third));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.controls_same_video_resource(&c));
}

#[test]
fn voxel_edits_are_visible_through_features() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let root = scene.root();
    helper
        .create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::ONE))
        .unwrap();

    helper.grid_mut().set_voxel(UVec3::new(9, 9, 9), 42).unwrap();

    let tail = scene.geometry(segment_node(&scene, UVec3::splat(2))).unwrap();
    let texture = tail
        .feature(VolumeRenderer::ROLE_INTENSITIES)
        .and_then(|feature| feature.downcast_ref::<VolumeTexture<u8>>())
        .unwrap();
    assert_eq!(texture.buffer().read().get(UVec3::splat(1)).unwrap(), 42);
}

#[test]
fn volume_can_be_placed_below_any_node() {
    let mut helper = small_helper();
    let mut scene = Scene::new();
    let anchor = scene.build_node().with_position(Vec3::new(100.0, 0.0, 0.0)).build().unwrap();
    let pivot = helper
        .create_node(&mut scene, anchor, VOLUME, Dimensions::Extent(Vec3::splat(10.0)))
        .unwrap();
    scene.update_world_transforms();

    assert_eq!(scene.parent(pivot), Some(anchor));
    let origin = scene.get(pivot).unwrap().world_matrix().transform_point3(Vec3::ZERO);
    assert_vec3_near(origin, Vec3::new(95.0, -5.0, -5.0));
}
