//! Geometry Feature Integration Tests
//!
//! Tests for:
//! - Acquisition counting: upload on first acquisition, release on last
//! - Version-driven re-uploads of volume textures and color maps
//! - Shared video resources and device limits
//! - Materials: shared programs, typed uniforms
//! - Shader manager: template expansion and program caching

use glam::{UVec3, Vec3, Vec4};
use volumetra::VolumetraError;
use volumetra::renderer::{HeadlessDevice, ResourceKind, ShaderManager, VideoDevice};
use volumetra::resources::{
    ColorMap, ColorMapTexture, GeometryFeature, Material, MeshFactory, ShaderDefines, UniformLayout, UniformType,
    UploadContext, VolumeTexture,
};
use volumetra::volume::{SharedVoxelBuffer, TexelFormat, VoxelBuffer};

struct Harness {
    device: HeadlessDevice,
    shaders: ShaderManager,
}

impl Harness {
    fn new() -> Self {
        Self::with_device(HeadlessDevice::new())
    }

    fn with_device(device: HeadlessDevice) -> Self {
        Self {
            device,
            shaders: ShaderManager::new().unwrap(),
        }
    }

    fn ctx(&mut self) -> UploadContext<'_> {
        UploadContext {
            device: &mut self.device,
            shaders: &mut self.shaders,
        }
    }
}

fn cube(side: u32) -> SharedVoxelBuffer<u8> {
    VoxelBuffer::from_fn(UVec3::splat(side), |c| c.x as u8).into_shared()
}

fn texture_feature(label: &str, buffer: &SharedVoxelBuffer<u8>) -> GeometryFeature {
    GeometryFeature::new(VolumeTexture::new(label, buffer.clone()))
}

// ============================================================================
// Acquisition Counting
// ============================================================================

#[test]
fn first_acquisition_uploads_once() {
    let mut h = Harness::new();
    let feature = texture_feature("segment", &cube(4));
    assert!(!feature.is_uploaded());

    let first = feature.acquire_video_resource(&mut h.ctx()).unwrap();
    let second = feature.acquire_video_resource(&mut h.ctx()).unwrap();

    assert!(feature.is_uploaded());
    assert_eq!(feature.video_resource_acquisitions_count(), 2);
    assert_eq!(first.id(), second.id());
    assert_eq!(h.device.live_resource_count(), 1);

    let resource = h.device.resource(first.id()).unwrap();
    assert!(matches!(
        resource.kind,
        ResourceKind::Texture3d {
            size,
            format: TexelFormat::R8Unorm,
            ..
        } if size == UVec3::splat(4)
    ));
}

#[test]
fn last_release_frees_resource_once() {
    let mut h = Harness::new();
    let feature = texture_feature("segment", &cube(2));
    let first = feature.acquire_video_resource(&mut h.ctx()).unwrap();
    let second = feature.acquire_video_resource(&mut h.ctx()).unwrap();

    drop(first);
    assert_eq!(feature.video_resource_acquisitions_count(), 1);
    assert_eq!(h.device.collect_released(), 0);

    drop(second);
    assert_eq!(feature.video_resource_acquisitions_count(), 0);
    assert!(!feature.is_uploaded());
    assert_eq!(h.device.collect_released(), 1);
    assert_eq!(h.device.released(), ["segment"]);
    assert_eq!(h.device.live_resource_count(), 0);
    assert_eq!(h.device.memory_used(), 0);
}

#[test]
fn reacquisition_after_release_uploads_again() {
    let mut h = Harness::new();
    let feature = texture_feature("segment", &cube(2));
    drop(feature.acquire_video_resource(&mut h.ctx()).unwrap());
    h.device.collect_released();

    let again = feature.acquire_video_resource(&mut h.ctx()).unwrap();
    assert!(h.device.contains(again.id()));
    assert_eq!(h.device.live_resource_count(), 1);
}

#[test]
fn failed_upload_leaves_no_acquisition() {
    let mut h = Harness::with_device(HeadlessDevice::new().with_memory_budget(100));
    let kept = texture_feature("first", &cube(4));
    let rejected = texture_feature("second", &cube(4));

    let _guard = kept.acquire_video_resource(&mut h.ctx()).unwrap();
    let err = rejected.acquire_video_resource(&mut h.ctx()).unwrap_err();

    assert!(matches!(err, VolumetraError::ResourceAcquisition { ref label, .. } if label == "second"));
    assert_eq!(rejected.video_resource_acquisitions_count(), 0);
    assert!(!rejected.is_uploaded());
    assert_eq!(h.device.memory_used(), 64);
}

#[test]
fn oversized_texture_is_rejected_by_device() {
    let mut h = Harness::with_device(HeadlessDevice::new().with_max_texture_3d_size(2));
    let feature = texture_feature("big", &cube(4));
    assert!(matches!(
        feature.acquire_video_resource(&mut h.ctx()),
        Err(VolumetraError::ResourceAcquisition { .. })
    ));
}

// ============================================================================
// Synchronization
// ============================================================================

#[test]
fn sync_uploads_only_after_changes() {
    let mut h = Harness::new();
    let buffer = cube(2);
    let feature = texture_feature("segment", &buffer);
    let guard = feature.acquire_video_resource(&mut h.ctx()).unwrap();

    assert!(!guard.sync(&mut h.ctx()).unwrap());

    buffer.write().set(UVec3::ZERO, 200).unwrap();
    assert!(guard.sync(&mut h.ctx()).unwrap());
    assert!(!guard.sync(&mut h.ctx()).unwrap());

    let resource = h.device.resource(guard.id()).unwrap();
    assert_eq!(resource.writes, 1);
    let ResourceKind::Texture3d { data, .. } = &resource.kind else {
        panic!("expected a texture");
    };
    assert_eq!(data[0], 200);
}

#[test]
fn color_map_edits_reach_the_texture() {
    let mut h = Harness::new();
    let map = ColorMap::default().into_shared();
    let feature = GeometryFeature::new(ColorMapTexture::new("color map", map.clone()));
    let guard = feature.acquire_video_resource(&mut h.ctx()).unwrap();

    let resource = h.device.resource(guard.id()).unwrap();
    assert!(matches!(
        resource.kind,
        ResourceKind::Texture3d { size, format: TexelFormat::Rgba8Unorm, .. } if size == UVec3::new(256, 1, 1)
    ));

    map.write()
        .write_linear_spline(&[Vec4::ZERO, Vec4::ONE])
        .unwrap();
    assert!(guard.sync(&mut h.ctx()).unwrap());

    let ResourceKind::Texture3d { data, .. } = &h.device.resource(guard.id()).unwrap().kind else {
        panic!("expected a texture");
    };
    assert_eq!(&data[..4], &[0, 0, 0, 0]);
    assert_eq!(&data[data.len() - 4..], &[255, 255, 255, 255]);
}

// ============================================================================
// Shared Video Resources
// ============================================================================

#[test]
fn features_over_one_buffer_control_same_resource() {
    let buffer = cube(2);
    let a = texture_feature("a", &buffer);
    let b = texture_feature("b", &buffer);
    let c = texture_feature("c", &cube(2));

    assert!(a.controls_same_video_resource(&a.clone()));
    assert!(a.controls_same_video_resource(&b));
    assert!(!a.controls_same_video_resource(&c));
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}

#[test]
fn mesh_uploads_vertices_and_indices() {
    let mut h = Harness::new();
    let feature = GeometryFeature::new(MeshFactory::create_box(Vec3::ONE).unwrap());
    let guard = feature.acquire_video_resource(&mut h.ctx()).unwrap();

    let resource = h.device.resource(guard.id()).unwrap();
    assert!(matches!(
        resource.kind,
        ResourceKind::Mesh {
            vertex_count: 24,
            index_count: 36,
            ..
        }
    ));
}

// ============================================================================
// Materials
// ============================================================================

#[test]
fn equal_materials_share_one_program() {
    let mut h = Harness::new();
    let red = GeometryFeature::new(Material::solid("red", Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let blue = GeometryFeature::new(Material::solid("blue", Vec4::new(0.0, 0.0, 1.0, 1.0)));

    let red_guard = red.acquire_video_resource(&mut h.ctx()).unwrap();
    let blue_guard = blue.acquire_video_resource(&mut h.ctx()).unwrap();
    assert_eq!(red_guard.id(), blue_guard.id());
    assert_eq!(h.shaders.program_count(), 1);
    assert!(h.device.resource(red_guard.id()).unwrap().is_program());

    // Programs belong to the shader manager, not to the material.
    drop((red_guard, blue_guard));
    assert_eq!(h.device.collect_released(), 0);
}

#[test]
fn material_with_unknown_shader_reports_it() {
    let mut h = Harness::new();
    let feature = GeometryFeature::new(Material::builder("custom", "no-such-shader").build());
    assert!(matches!(
        feature.acquire_video_resource(&mut h.ctx()),
        Err(VolumetraError::ShaderNotFound(name)) if name == "no-such-shader"
    ));
}

#[test]
fn rejected_program_is_a_compilation_error() {
    let mut h = Harness::new();
    h.device.reject_shader("mesh");
    let feature = GeometryFeature::new(Material::solid("red", Vec4::ONE));
    let err = feature.acquire_video_resource(&mut h.ctx()).unwrap_err();
    assert!(err.disables_stage());
    assert!(matches!(err, VolumetraError::ShaderCompilation { .. }));
}

#[test]
fn material_uniforms_are_typed() {
    let material = Material::builder("tinted", "mesh")
        .with_uniform("color", Vec4::ONE)
        .with_uniform("strength", 0.5_f32)
        .build();

    material.set_uniform("strength", 0.25_f32).unwrap();
    assert!(material.set_uniform("strength", Vec4::ONE).is_err());
    assert!(material.set_uniform("missing", 1.0_f32).is_err());
    assert!(material.set_uniform("model_view", glam::Mat4::IDENTITY).is_err());
    assert_eq!(material.uniform("strength"), Some(0.25_f32.into()));
}

#[test]
fn translucent_solid_material_blends() {
    assert!(Material::solid("glass", Vec4::new(1.0, 1.0, 1.0, 0.5)).render_state().is_blending());
    assert!(!Material::solid("wall", Vec4::ONE).render_state().is_blending());
}

// ============================================================================
// Shader Manager
// ============================================================================

#[test]
fn volume_shader_expands_per_mode() {
    let shaders = ShaderManager::new().unwrap();
    let layout = UniformLayout::new([("step_length", UniformType::Float)]);

    let mip = shaders
        .render("volume", &ShaderDefines::new().with("MODE", "MIP"), &layout)
        .unwrap();
    let dvr = shaders
        .render(
            "volume",
            &ShaderDefines::new().with("MODE", "DVR").with("USE_NORMALS", "1"),
            &layout,
        )
        .unwrap();

    assert!(mip.contains("fn vs_main"));
    assert!(mip.contains("step_length"));
    assert_ne!(mip, dvr);
}

#[test]
fn registered_sources_override_and_extend() {
    let mut shaders = ShaderManager::new().unwrap();
    assert!(!shaders.has_source("custom"));
    shaders
        .register_source("custom", "fn vs_main() {}\nfn fs_main() {}\n// {{ defines.TAG }}")
        .unwrap();

    let source = shaders
        .render("custom", &ShaderDefines::new().with("TAG", "hello"), &UniformLayout::new([]))
        .unwrap();
    assert!(source.contains("// hello"));
}
