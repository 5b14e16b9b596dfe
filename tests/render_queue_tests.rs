//! Render Queue Integration Tests
//!
//! Tests for:
//! - Queue building: geometry type matching, masks, per-frame rebuild
//! - Poll orders: insertion, front-to-back, back-to-front, by video resource
//! - Order switches mid-queue and rewinding

use glam::{Mat4, Vec3};
use volumetra::renderer::{RenderOrder, RenderQueue};
use volumetra::resources::{GeometryFeature, MeshFactory};
use volumetra::scene::{NodeHandle, Scene};

const VOLUME: u32 = 2;
const MESH: u32 = 1;

fn box_feature() -> GeometryFeature {
    GeometryFeature::new(MeshFactory::create_box(Vec3::ONE).unwrap())
}

/// Camera at the origin looking down -Z, so depth equals `-z`.
fn view() -> Mat4 {
    Mat4::IDENTITY
}

/// Geometries of type `VOLUME` at the given depths, in insertion order.
fn scene_with_depths(depths: &[f32]) -> (Scene, Vec<NodeHandle>) {
    let mut scene = Scene::new();
    let handles = depths
        .iter()
        .map(|&depth| {
            scene
                .build_geometry(VOLUME)
                .with_position(Vec3::new(0.0, 0.0, -depth))
                .build()
                .unwrap()
        })
        .collect();
    scene.update_world_transforms();
    (scene, handles)
}

fn drain(queue: &mut RenderQueue, order: RenderOrder) -> Vec<NodeHandle> {
    let mut polled = Vec::new();
    while let Some(renderable) = queue.poll(order) {
        polled.push(renderable.geometry());
    }
    polled
}

// ============================================================================
// Building
// ============================================================================

#[test]
fn queue_collects_only_its_geometry_type() {
    let mut scene = Scene::new();
    let root = scene.root();
    let volume = scene.create_geometry(root, VOLUME).unwrap();
    scene.create_geometry(root, MESH).unwrap();
    scene.create_node(root).unwrap();
    scene.update_world_transforms();

    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, root, view());

    assert_eq!(queue.len(), 1);
    assert_eq!(drain(&mut queue, RenderOrder::Insertion), [volume]);
}

#[test]
fn masked_queue_accepts_type_family() {
    let mut queue = RenderQueue::with_mask(0b0100, 0b0100);
    assert!(queue.matches(0b0100));
    assert!(queue.matches(0b0111));
    assert!(!queue.matches(0b0011));

    let mut scene = Scene::new();
    let root = scene.root();
    scene.create_geometry(root, 0b0101).unwrap();
    scene.create_geometry(root, 0b0110).unwrap();
    scene.create_geometry(root, 0b0010).unwrap();
    queue.build(&scene, root, view());
    assert_eq!(queue.len(), 2);
}

#[test]
fn queue_is_rebuilt_every_frame() {
    let (mut scene, handles) = scene_with_depths(&[1.0, 2.0]);
    let root = scene.root();
    let mut queue = RenderQueue::new(VOLUME);

    queue.build(&scene, root, view());
    assert_eq!(queue.len(), 2);

    scene.remove(handles[0]).unwrap();
    queue.build(&scene, root, view());
    assert_eq!(queue.len(), 1);
    assert_eq!(drain(&mut queue, RenderOrder::Insertion), [handles[1]]);
}

#[test]
fn build_respects_subtree_root() {
    let mut scene = Scene::new();
    let left = scene.build_node().build().unwrap();
    let right = scene.build_node().build().unwrap();
    let inside = scene.build_geometry(VOLUME).with_parent(left).build().unwrap();
    scene.build_geometry(VOLUME).with_parent(right).build().unwrap();

    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, left, view());
    assert_eq!(drain(&mut queue, RenderOrder::Insertion), [inside]);
}

#[test]
fn renderables_snapshot_features() {
    let mut scene = Scene::new();
    let feature = box_feature();
    scene
        .build_geometry(VOLUME)
        .with_feature(3, feature.clone())
        .build()
        .unwrap();

    let mut queue = RenderQueue::new(VOLUME);
    let root = scene.root();
    queue.build(&scene, root, view());
    let renderable = queue.poll(RenderOrder::Insertion).unwrap();
    assert_eq!(renderable.feature(3), Some(&feature));
    assert!(renderable.feature(0).is_none());
}

// ============================================================================
// Orders
// ============================================================================

#[test]
fn front_to_back_sorts_by_ascending_depth() {
    let (scene, h) = scene_with_depths(&[5.0, 1.0, 3.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());
    assert_eq!(drain(&mut queue, RenderOrder::FrontToBack), [h[1], h[2], h[0]]);
}

#[test]
fn back_to_front_sorts_by_descending_depth() {
    let (scene, h) = scene_with_depths(&[5.0, 1.0, 3.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());
    assert_eq!(drain(&mut queue, RenderOrder::BackToFront), [h[0], h[2], h[1]]);
}

#[test]
fn equal_depths_keep_insertion_order() {
    let (scene, h) = scene_with_depths(&[2.0, 2.0, 2.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());
    assert_eq!(drain(&mut queue, RenderOrder::BackToFront), h);
}

#[test]
fn depth_follows_view_transform() {
    let (scene, h) = scene_with_depths(&[1.0, 3.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());
    assert_eq!(queue.first(RenderOrder::FrontToBack).map(|r| r.geometry()), Some(h[0]));

    // Looking from -10 along +Z reverses the depths.
    let turned = Mat4::look_at_rh(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, Vec3::Y);
    queue.update_model_view_transforms(turned);
    assert_eq!(queue.first(RenderOrder::FrontToBack).map(|r| r.geometry()), Some(h[1]));
}

#[test]
fn video_resource_order_groups_shared_features() {
    let mut scene = Scene::new();
    let a = box_feature();
    let b = box_feature();
    let g0 = scene.build_geometry(VOLUME).with_feature(0, a.clone()).build().unwrap();
    let g1 = scene.build_geometry(VOLUME).with_feature(0, b.clone()).build().unwrap();
    let g2 = scene.build_geometry(VOLUME).build().unwrap();
    let g3 = scene.build_geometry(VOLUME).with_feature(0, a).build().unwrap();

    let mut queue = RenderQueue::new(VOLUME);
    let root = scene.root();
    queue.build(&scene, root, view());

    let order = drain(&mut queue, RenderOrder::VideoResources(0));
    assert_eq!(order, [g0, g3, g1, g2]);
}

// ============================================================================
// Cursor
// ============================================================================

#[test]
fn first_and_last_do_not_advance() {
    let (scene, h) = scene_with_depths(&[1.0, 2.0, 3.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());

    assert_eq!(queue.first(RenderOrder::FrontToBack).map(|r| r.geometry()), Some(h[0]));
    assert_eq!(queue.last(RenderOrder::FrontToBack).map(|r| r.geometry()), Some(h[2]));
    assert_eq!(queue.remaining(), 3);
}

#[test]
fn switching_order_resorts_only_remaining_entries() {
    let (scene, h) = scene_with_depths(&[1.0, 4.0, 2.0, 3.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());

    assert_eq!(queue.poll(RenderOrder::FrontToBack).map(|r| r.geometry()), Some(h[0]));
    assert_eq!(queue.remaining(), 3);
    assert_eq!(drain(&mut queue, RenderOrder::BackToFront), [h[1], h[3], h[2]]);
    assert!(queue.poll(RenderOrder::BackToFront).is_none());
}

#[test]
fn rewind_makes_entries_available_again() {
    let (scene, h) = scene_with_depths(&[1.0, 2.0]);
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());

    assert_eq!(drain(&mut queue, RenderOrder::FrontToBack).len(), 2);
    assert_eq!(queue.remaining(), 0);

    queue.rewind();
    assert_eq!(drain(&mut queue, RenderOrder::BackToFront), [h[1], h[0]]);
}

#[test]
fn empty_queue_polls_nothing() {
    let scene = Scene::new();
    let mut queue = RenderQueue::new(VOLUME);
    queue.build(&scene, scene.root(), view());
    assert!(queue.is_empty());
    assert!(queue.poll(RenderOrder::Insertion).is_none());
    assert!(queue.first(RenderOrder::FrontToBack).is_none());
    assert!(queue.last(RenderOrder::FrontToBack).is_none());
}
