//! Renders a DVR view of a synthetic volume on the GPU and writes it to
//! `volume.ppm`.
//!
//! ```text
//! cargo run --example wgpu_volume --features wgpu
//! ```

use std::io::Write;

use volumetra::prelude::*;
use volumetra::renderer::WgpuDevice;

const VOLUME: u32 = 2;
const SIZE: u32 = 512;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = RendererSettings::default();
    let device = WgpuDevice::new()?;

    // Nested shells of increasing density.
    let resolution = UVec3::splat(128);
    let center = resolution.as_vec3() / 2.0;
    let mut helper = VolumeGridHelper::<u8>::for_device(resolution, &settings, &device, true)?;
    helper.load_intensities(|coord| {
        let distance = coord.as_vec3().distance(center) / center.x;
        if distance > 1.0 { 0.0 } else { ((1.0 - distance) * 4.0).floor() / 4.0 }
    })?;

    let mut scene = Scene::new();
    let root = scene.root();
    helper.create_node(&mut scene, root, VOLUME, Dimensions::Extent(Vec3::splat(100.0)))?;

    let stage = VolumeRenderingStage::with_settings(VOLUME, VolumeMode::Dvr(DvrSettings::default()), &settings)?;
    stage.renderer().color_map().write().write_linear_spline(&[
        Vec4::ZERO,
        Vec4::new(0.2, 0.4, 1.0, 0.3),
        Vec4::new(1.0, 0.6, 0.2, 0.7),
        Vec4::ONE,
    ])?;

    let mut renderer = FrameRenderer::new(device, Framebuffer::new(SIZE, SIZE), settings)?;
    renderer.sequence_mut().append_stage(stage);

    let camera = Camera::perspective(45.0, 1.0, 1.0, 1000.0).look_at(Vec3::new(120.0, 80.0, 160.0), Vec3::ZERO, Vec3::Y);
    let report = renderer.render(&mut scene, root, &camera)?;
    log::info!(
        "{} draw calls, {} bytes of video memory",
        report.total_draw_calls(),
        renderer.device().memory_used()
    );

    let pixels = renderer.device().read_pixels()?;
    let mut file = std::io::BufWriter::new(std::fs::File::create("volume.ppm")?);
    write!(file, "P6\n{SIZE} {SIZE}\n255\n")?;
    for rgba in pixels.chunks_exact(4) {
        file.write_all(&rgba[..3])?;
    }
    file.flush()?;
    println!("wrote volume.ppm");

    renderer.release_video_resources();
    Ok(())
}
