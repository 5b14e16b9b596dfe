//! Scene Integration Tests
//!
//! Tests for:
//! - Scene: create/remove spatials, attach/detach hierarchy
//! - Geometry features: one feature per role
//! - Traversal order and tag lookup
//! - World transform propagation

use glam::{Affine3A, Mat4, Quat, Vec3};
use volumetra::VolumetraError;
use volumetra::resources::{GeometryFeature, MeshFactory};
use volumetra::scene::{Scene, Spatial, Transform};

fn box_feature() -> GeometryFeature {
    GeometryFeature::new(MeshFactory::create_box(Vec3::ONE).unwrap())
}

fn assert_vec3_near(actual: Vec3, expected: Vec3) {
    assert!(
        (actual - expected).length() < 1e-5,
        "expected {expected}, got {actual}"
    );
}

// ============================================================================
// Spatial Creation & Removal
// ============================================================================

#[test]
fn new_scene_has_only_root() {
    let scene = Scene::new();
    assert_eq!(scene.len(), 1);
    assert!(scene.parent(scene.root()).is_none());
    assert_eq!(scene.get(scene.root()).map(|s| s.tag.as_str()), Some("root"));
}

#[test]
fn create_node_and_geometry() {
    let mut scene = Scene::new();
    let root = scene.root();
    let node = scene.create_node(root).unwrap();
    let geometry = scene.create_geometry(node, 3).unwrap();

    assert_eq!(scene.len(), 3);
    assert_eq!(scene.parent(geometry), Some(node));
    assert_eq!(scene.children(node), &[geometry]);
    assert_eq!(scene.geometry(geometry).map(|g| g.geometry_type()), Some(3));
    assert!(scene.geometry(node).is_none());
}

#[test]
fn geometries_cannot_have_children() {
    let mut scene = Scene::new();
    let root = scene.root();
    let geometry = scene.create_geometry(root, 1).unwrap();
    assert!(matches!(
        scene.create_node(geometry),
        Err(VolumetraError::Hierarchy(_))
    ));
}

#[test]
fn remove_drops_whole_subtree() {
    let mut scene = Scene::new();
    let root = scene.root();
    let parent = scene.create_node(root).unwrap();
    let child = scene.create_node(parent).unwrap();
    let leaf = scene.create_geometry(child, 1).unwrap();

    scene.remove(parent).unwrap();

    assert_eq!(scene.len(), 1);
    assert!(!scene.contains(child));
    assert!(!scene.contains(leaf));
    assert!(scene.children(root).is_empty());
}

#[test]
fn stale_handles_are_rejected() {
    let mut scene = Scene::new();
    let root = scene.root();
    let node = scene.create_node(root).unwrap();
    scene.remove(node).unwrap();

    assert!(matches!(scene.remove(node), Err(VolumetraError::Hierarchy(_))));
    assert!(scene.create_node(node).is_err());
}

#[test]
fn root_cannot_be_detached() {
    let mut scene = Scene::new();
    let root = scene.root();
    assert!(scene.detach(root).is_err());
}

// ============================================================================
// Attach / Detach
// ============================================================================

#[test]
fn attach_moves_subtree_to_end_of_new_parent() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.create_node(root).unwrap();
    let b = scene.create_node(root).unwrap();
    let existing = scene.create_node(b).unwrap();
    let moved = scene.create_geometry(a, 1).unwrap();

    scene.attach(moved, b).unwrap();

    assert!(scene.children(a).is_empty());
    assert_eq!(scene.children(b), &[existing, moved]);
    assert_eq!(scene.parent(moved), Some(b));
}

#[test]
fn attach_below_own_descendant_is_rejected() {
    let mut scene = Scene::new();
    let root = scene.root();
    let parent = scene.create_node(root).unwrap();
    let child = scene.create_node(parent).unwrap();

    assert!(matches!(
        scene.attach(parent, child),
        Err(VolumetraError::Hierarchy(_))
    ));
    assert!(scene.attach(parent, parent).is_err());
    assert_eq!(scene.parent(child), Some(parent));
}

#[test]
fn detach_and_reinsert_subtree() {
    let mut scene = Scene::new();
    let root = scene.root();
    let group = scene.build_node().with_tag("group").build().unwrap();
    scene.build_geometry(1).with_tag("first").with_parent(group).build().unwrap();
    scene.build_geometry(1).with_tag("second").with_parent(group).build().unwrap();

    let subtree = scene.detach(group).unwrap();
    assert_eq!(subtree.len(), 3);
    assert_eq!(scene.len(), 1);
    assert!(scene.find_by_tag("first").is_none());

    let other = scene.create_node(root).unwrap();
    let group = scene.insert_subtree(subtree, other).unwrap();
    assert_eq!(scene.len(), 5);
    let tags: Vec<_> = scene
        .children(group)
        .iter()
        .filter_map(|&child| scene.get(child))
        .map(|spatial| spatial.tag.clone())
        .collect();
    assert_eq!(tags, ["first", "second"]);
}

// ============================================================================
// Features
// ============================================================================

#[test]
fn builder_attaches_features_by_role() {
    let mut scene = Scene::new();
    let mesh = box_feature();
    let geometry = scene
        .build_geometry(1)
        .with_feature(0, mesh.clone())
        .build()
        .unwrap();

    let geometry = scene.geometry(geometry).unwrap();
    assert_eq!(geometry.features_count(), 1);
    assert_eq!(geometry.feature(0), Some(&mesh));
    assert!(geometry.has_feature_instance(&mesh));
}

#[test]
fn putting_a_feature_replaces_the_role() {
    let mut scene = Scene::new();
    let root = scene.root();
    let handle = scene.create_geometry(root, 1).unwrap();
    let first = box_feature();
    let second = box_feature();

    let geometry = scene.geometry_mut(handle).unwrap();
    assert!(geometry.put_feature(0, first.clone()).is_none());
    assert_eq!(geometry.put_feature(0, second.clone()), Some(first));
    assert_eq!(geometry.features_count(), 1);
    assert_eq!(geometry.remove_feature(0), Some(second));
    assert!(!geometry.has_feature(0));
}

#[test]
fn one_feature_instance_can_serve_many_roles() {
    let mut scene = Scene::new();
    let root = scene.root();
    let handle = scene.create_geometry(root, 1).unwrap();
    let shared = box_feature();

    let geometry = scene.geometry_mut(handle).unwrap();
    geometry.put_feature(0, shared.clone());
    geometry.put_feature(4, shared.clone());
    assert_eq!(geometry.features_count(), 2);
    assert_eq!(geometry.remove_feature_instance(&shared), 2);
    assert_eq!(geometry.features_count(), 0);
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn traversal_is_depth_first_pre_order() {
    let mut scene = Scene::new();
    let a = scene.build_node().with_tag("a").build().unwrap();
    scene.build_geometry(1).with_tag("a1").with_parent(a).build().unwrap();
    scene.build_geometry(1).with_tag("a2").with_parent(a).build().unwrap();
    scene.build_geometry(1).with_tag("b").build().unwrap();

    let root = scene.root();
    let tags: Vec<_> = scene.traverse(root).map(|(_, s)| s.tag.clone()).collect();
    assert_eq!(tags, ["root", "a", "a1", "a2", "b"]);

    let geometries: Vec<_> = scene.geometries(a).map(|(handle, _)| handle).collect();
    assert_eq!(geometries.len(), 2);
}

#[test]
fn user_data_is_typed() {
    let mut spatial = Spatial::node();
    spatial.set_user_data(42_u32);
    assert_eq!(spatial.user_data::<u32>(), Some(&42));
    assert!(spatial.user_data::<String>().is_none());
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn transform_defaults_to_identity() {
    let transform = Transform::new();
    assert_eq!(transform.position, Vec3::ZERO);
    assert_eq!(transform.rotation, Quat::IDENTITY);
    assert_eq!(transform.scale, Vec3::ONE);
    assert_eq!(*transform.world_matrix(), Affine3A::IDENTITY);
}

#[test]
fn local_matrix_rebuilds_only_on_change() {
    let mut transform = Transform::new();
    assert!(transform.update_local_matrix());
    assert!(!transform.update_local_matrix());

    transform.position = Vec3::new(1.0, 2.0, 3.0);
    assert!(transform.update_local_matrix());
    assert_vec3_near(transform.local_matrix().translation.into(), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn apply_local_matrix_decomposes_trs() {
    let mut transform = Transform::new();
    let rotation = Quat::from_rotation_y(0.5);
    transform.apply_local_matrix_from_mat4(Mat4::from_scale_rotation_translation(
        Vec3::splat(2.0),
        rotation,
        Vec3::new(4.0, 5.0, 6.0),
    ));
    assert_vec3_near(transform.position, Vec3::new(4.0, 5.0, 6.0));
    assert_vec3_near(transform.scale, Vec3::splat(2.0));
    assert!(transform.rotation.abs_diff_eq(rotation, 1e-5));
}

#[test]
fn look_at_points_negative_z_at_target() {
    let mut transform = Transform::new();
    transform.position = Vec3::new(0.0, 0.0, 5.0);
    transform.look_at(Vec3::ZERO, Vec3::Y);
    assert_vec3_near(transform.rotation * Vec3::NEG_Z, Vec3::NEG_Z);

    transform.look_at(Vec3::new(5.0, 0.0, 5.0), Vec3::Y);
    assert_vec3_near(transform.rotation * Vec3::NEG_Z, Vec3::X);
}

#[test]
fn world_transforms_compose_down_the_hierarchy() {
    let mut scene = Scene::new();
    let parent = scene
        .build_node()
        .with_position(Vec3::new(10.0, 0.0, 0.0))
        .with_scale(Vec3::splat(2.0))
        .build()
        .unwrap();
    let child = scene
        .build_geometry(1)
        .with_parent(parent)
        .with_position(Vec3::new(1.0, 1.0, 0.0))
        .build()
        .unwrap();

    scene.update_world_transforms();

    let world = scene.get(child).unwrap().world_matrix();
    assert_vec3_near(world.transform_point3(Vec3::ZERO), Vec3::new(12.0, 2.0, 0.0));
}

#[test]
fn moving_a_parent_moves_its_children() {
    let mut scene = Scene::new();
    let parent = scene.build_node().build().unwrap();
    let child = scene
        .build_node()
        .with_parent(parent)
        .with_position(Vec3::X)
        .build()
        .unwrap();
    scene.update_world_transforms();

    scene.get_mut(parent).unwrap().transform.position = Vec3::new(0.0, 5.0, 0.0);
    scene.update_world_transforms();

    let world = scene.get(child).unwrap().world_matrix();
    assert_vec3_near(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 5.0, 0.0));
}

#[test]
fn reattached_spatial_follows_its_new_parent() {
    let mut scene = Scene::new();
    let left = scene.build_node().with_position(Vec3::NEG_X).build().unwrap();
    let right = scene.build_node().with_position(Vec3::X).build().unwrap();
    let child = scene.build_geometry(1).with_parent(left).build().unwrap();
    scene.update_world_transforms();
    assert_vec3_near(
        scene.get(child).unwrap().world_matrix().transform_point3(Vec3::ZERO),
        Vec3::NEG_X,
    );

    scene.attach(child, right).unwrap();
    assert_vec3_near(
        scene.get(child).unwrap().world_matrix().transform_point3(Vec3::ZERO),
        Vec3::X,
    );
    scene.update_world_transforms();
    assert_vec3_near(
        scene.get(child).unwrap().world_matrix().transform_point3(Vec3::ZERO),
        Vec3::X,
    );
}

#[test]
fn inserted_subtree_is_placed_below_its_new_parent() {
    let mut scene = Scene::new();
    let group = scene.build_node().with_position(Vec3::Y).build().unwrap();
    let leaf = scene.build_geometry(1).with_position(Vec3::Z).with_parent(group).build().unwrap();
    scene.update_world_transforms();
    let subtree = scene.detach(group).unwrap();
    assert!(scene.get(leaf).is_none());

    let anchor = scene.build_node().with_position(Vec3::new(10.0, 0.0, 0.0)).build().unwrap();
    scene.update_world_transforms();
    let group = scene.insert_subtree(subtree, anchor).unwrap();

    let leaf = scene.children(group)[0];
    assert_vec3_near(
        scene.get(leaf).unwrap().world_matrix().transform_point3(Vec3::ZERO),
        Vec3::new(10.0, 1.0, 1.0),
    );
    assert_eq!(scene.parent(group), Some(anchor));
    assert_eq!(scene.len(), 4);
}

#[test]
fn deep_chains_detach_in_order() {
    let mut scene = Scene::new();
    let root = scene.root();
    let top = scene.build_node().with_tag("0").build().unwrap();
    let mut parent = top;
    for depth in 1..2_000 {
        let sibling = scene.build_geometry(1).with_tag("leaf").with_parent(parent).build().unwrap();
        let next = scene.build_node().with_tag(&depth.to_string()).with_parent(parent).build().unwrap();
        assert_eq!(scene.children(parent), &[sibling, next]);
        parent = next;
    }

    let subtree = scene.detach(top).unwrap();
    assert_eq!(subtree.len(), 2 * 2_000 - 1);
    assert_eq!(scene.len(), 1);

    let mut level = &subtree;
    for depth in 0..2_000 {
        assert_eq!(level.spatial.tag, depth.to_string());
        assert!(level.spatial.parent().is_none());
        match level.children.as_slice() {
            [leaf, next] => {
                assert_eq!(leaf.spatial.tag, "leaf");
                level = next;
            }
            [] => assert_eq!(depth, 1_999),
            other => panic!("unexpected children: {}", other.len()),
        }
    }
    assert!(scene.children(root).is_empty());
}
