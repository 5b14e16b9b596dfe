//! Renders a synthetic CT phantom with every volume mode on the recording
//! device and logs what each frame issued.
//!
//! ```text
//! RUST_LOG=debug cargo run --example offscreen_volume
//! ```

use volumetra::prelude::*;

const OPAQUE: u32 = 1;
const VOLUME: u32 = 2;

/// Skull-like phantom: a bone shell filled with soft tissue, with a
/// water-filled cavity off center.
fn phantom(resolution: UVec3) -> impl Fn(UVec3) -> i16 {
    let center = resolution.as_vec3() / 2.0;
    let radius = center.min_element();
    let cavity = center + Vec3::new(radius * 0.3, 0.0, 0.0);
    move |coord| {
        let p = coord.as_vec3();
        let distance = p.distance(center) / radius;
        if distance > 1.0 {
            -1000
        } else if distance > 0.9 {
            1400
        } else if p.distance(cavity) < radius * 0.2 {
            0
        } else {
            40
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = RendererSettings {
        max_segment_bytesize: 2 * 64 * 64 * 64,
        log_fps: true,
        ..RendererSettings::default()
    };
    let device = HeadlessDevice::from_settings(&settings);

    let resolution = UVec3::new(160, 160, 120);
    let mut helper = VolumeGridHelper::<Hounsfield>::for_device(resolution, &settings, &device, true)?;
    helper.load_hounsfield(phantom(resolution))?;

    let mut scene = Scene::new();
    let root = scene.root();
    helper.create_node(&mut scene, root, VOLUME, Dimensions::Spacing(Vec3::new(0.5, 0.5, 0.8)))?;
    helper.release_geometry_features();

    scene
        .build_geometry(OPAQUE)
        .with_tag("marker")
        .with_position(Vec3::new(0.0, 0.0, 60.0))
        .with_feature(
            volumetra::renderer::MeshRenderer::ROLE_DEFAULT_MESH,
            GeometryFeature::new(MeshFactory::create_box(Vec3::splat(5.0))?),
        )
        .with_feature(
            volumetra::renderer::MeshRenderer::ROLE_DEFAULT_MATERIAL,
            GeometryFeature::new(Material::solid("marker", Vec4::new(1.0, 0.8, 0.0, 1.0))),
        )
        .build()?;

    let mut renderer = FrameRenderer::new(device, Framebuffer::new(512, 512), settings.clone())?;

    for mode in [
        VolumeMode::Mip,
        VolumeMode::Dvr(DvrSettings::default()),
        VolumeMode::Drr(DrrSettings::default()),
    ] {
        let volume = VolumeRenderingStage::with_settings(VOLUME, mode, &settings)?;
        volume
            .renderer()
            .color_map()
            .write()
            .clear()
            .write_linear_segment_hu(
                Hounsfield::new(-100),
                Hounsfield::new(200),
                Vec4::new(0.8, 0.4, 0.3, 0.0),
                Vec4::new(0.9, 0.5, 0.4, 0.2),
            )
            .write_linear_segment_hu(
                Hounsfield::new(200),
                Hounsfield::new(Hounsfield::MAX),
                Vec4::new(1.0, 1.0, 0.9, 0.6),
                Vec4::ONE,
            );

        let ids = StageOrder::new()
            .with(MeshRenderingStage::opaque(OPAQUE))
            .with(volume)
            .commit(renderer.sequence_mut(), true);
        log::info!("{} stages committed for {mode}", ids.len());

        for step in 0..4 {
            let angle = step as f32 * std::f32::consts::FRAC_PI_2;
            let eye = Vec3::new(angle.sin(), 0.3, angle.cos()) * 200.0;
            let camera = Camera::perspective(45.0, 1.0, 1.0, 1000.0).look_at(eye, Vec3::ZERO, Vec3::Y);

            renderer.device_mut().take_commands();
            let report = renderer.render(&mut scene, root, &camera)?;
            for error in &report.errors {
                log::warn!("stage \"{}\" failed: {}", error.stage, error.error);
            }
            println!(
                "{mode} frame {}: {} draw calls, {} skipped, {} bytes of video memory",
                renderer.frame_index(),
                report.total_draw_calls(),
                report.total_skipped(),
                renderer.device().memory_used(),
            );
        }
    }

    renderer.release_video_resources();
    println!("released {} video resources", renderer.device().released().len());
    Ok(())
}
