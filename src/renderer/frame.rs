//! Frame Renderer
//!
//! [`FrameRenderer`] drives one frame through the stage sequence:
//!
//! ```text
//! update world transforms
//!   └─ validate framebuffer / viewport   (failure aborts the frame)
//!   └─ free resources released last frame
//!   └─ for each stage, in order:
//!        disabled → end its acquisitions once
//!        enabled  → prepare_frame → update_render_queues → render_pass
//!   └─ composite into the framebuffer
//! ```
//!
//! Stage failures are isolated. A shader error disables the failing stage
//! for good; any other error only costs that stage its contribution to the
//! current frame, and a pass it left open is closed before the next stage
//! runs. Only an invalid framebuffer or viewport aborts the frame, and that
//! is detected before the frame is opened on the device.

use glam::Vec4;
use rustc_hash::FxHashSet;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::VideoDevice;
use crate::renderer::sequence::{RenderStageSequence, StageId};
use crate::renderer::settings::RendererSettings;
use crate::renderer::shader_manager::ShaderManager;
use crate::renderer::stage::{FrameContext, StageStats};
use crate::renderer::viewport::{Framebuffer, Viewport};
use crate::scene::{Camera, NodeHandle, Scene};
use crate::utils::FpsCounter;

/// Outcome of one stage in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub id: StageId,
    pub name: String,
    pub stats: StageStats,
}

/// A stage failure that did not abort the frame.
#[derive(Debug)]
pub struct StageError {
    pub id: StageId,
    pub stage: String,
    pub error: VolumetraError,
}

/// What happened during one frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Stages that completed their pass, in execution order.
    pub stages: Vec<StageReport>,
    pub errors: Vec<StageError>,
    /// Stages disabled because of an error during this frame.
    pub disabled: Vec<StageId>,
    /// Video resources freed at the start of the frame.
    pub released_resources: usize,
}

impl FrameReport {
    #[must_use]
    pub fn total_draw_calls(&self) -> usize {
        self.stages.iter().map(|stage| stage.stats.draw_calls).sum()
    }

    #[must_use]
    pub fn total_skipped(&self) -> usize {
        self.stages.iter().map(|stage| stage.stats.skipped).sum()
    }

    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&StageReport> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    /// Draw calls attributed to `id`; zero if the stage did not run.
    #[must_use]
    pub fn draw_calls_of(&self, id: StageId) -> usize {
        self.stage(id).map_or(0, |stage| stage.stats.draw_calls)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Renders a scene through a sequence of stages into a framebuffer.
pub struct FrameRenderer<D: VideoDevice> {
    device: D,
    shaders: ShaderManager,
    sequence: RenderStageSequence,
    framebuffer: Framebuffer,
    viewport: Viewport,
    background: Vec4,
    settings: RendererSettings,
    fps: FpsCounter,
    frame_index: u64,
    /// Stages that rendered since they were last released.
    holding: FxHashSet<StageId>,
}

impl<D: VideoDevice> FrameRenderer<D> {
    pub fn new(device: D, framebuffer: Framebuffer, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        framebuffer.validate()?;
        log::info!(
            "Frame renderer on {} ({}x{})",
            device.backend_name(),
            framebuffer.width(),
            framebuffer.height()
        );
        Ok(Self {
            device,
            shaders: ShaderManager::new()?,
            sequence: RenderStageSequence::new(),
            viewport: Viewport::full(&framebuffer),
            framebuffer,
            background: Vec4::from_array(settings.clear_color),
            settings,
            fps: FpsCounter::new(),
            frame_index: 0,
            holding: FxHashSet::default(),
        })
    }

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn shaders(&self) -> &ShaderManager {
        &self.shaders
    }

    /// Shader sources registered here are available to every stage.
    pub fn shaders_mut(&mut self) -> &mut ShaderManager {
        &mut self.shaders
    }

    #[must_use]
    pub fn sequence(&self) -> &RenderStageSequence {
        &self.sequence
    }

    pub fn sequence_mut(&mut self) -> &mut RenderStageSequence {
        &mut self.sequence
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Sets the rendered sub-rectangle. Checked against the framebuffer at
    /// the next frame.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Resizes the framebuffer; the viewport is reset to cover all of it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.framebuffer = Framebuffer::new(width, height);
        self.viewport = Viewport::full(&self.framebuffer);
    }

    #[must_use]
    pub fn background_color(&self) -> Vec4 {
        self.background
    }

    pub fn set_background_color(&mut self, color: Vec4) {
        self.background = color;
    }

    /// Frame rate over the last completed one-second window.
    #[must_use]
    pub fn frames_per_second(&self) -> f32 {
        self.fps.current_fps()
    }

    /// Number of frames rendered so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Renders the subtree of `root` as seen by `camera`.
    pub fn render(&mut self, scene: &mut Scene, root: NodeHandle, camera: &Camera) -> Result<FrameReport> {
        scene.update_world_transforms();
        let scene: &Scene = scene;

        self.framebuffer.validate()?;
        self.viewport.validate(&self.framebuffer)?;

        let released_resources = self.device.collect_released();
        self.device
            .begin_frame(&self.framebuffer, &self.viewport, self.background)?;

        let mut report = FrameReport {
            frame_index: self.frame_index,
            released_resources,
            ..FrameReport::default()
        };

        for (id, stage) in self.sequence.stages_mut() {
            if !stage.is_enabled() {
                if self.holding.remove(&id) {
                    log::debug!("Stage '{}' disabled, ending its acquisitions", stage.name());
                    stage.release_video_resources();
                }
                continue;
            }
            self.holding.insert(id);

            let view = stage.effective_view(camera.view);
            let mut ctx = FrameContext {
                device: &mut self.device,
                shaders: &mut self.shaders,
                viewport: self.viewport,
                frame_index: self.frame_index,
            };

            let outcome = match stage.prepare_frame(&mut ctx) {
                Ok(()) => {
                    stage.update_render_queues(scene, root, view);
                    stage.render_pass(&mut ctx, view, camera.projection)
                }
                Err(error) => Err(error),
            };

            let error = match outcome {
                Ok(stats) => {
                    report.stages.push(StageReport {
                        id,
                        name: stage.name().to_owned(),
                        stats,
                    });
                    continue;
                }
                Err(error) => error,
            };

            if self.device.is_pass_open()
                && let Err(close) = self.device.end_pass()
            {
                log::error!("Closing the pass of stage '{}' failed: {close}", stage.name());
            }

            match error {
                error if error.disables_stage() => {
                    log::error!("Disabling stage '{}': {error}", stage.name());
                    stage.set_enabled(false);
                    stage.release_video_resources();
                    self.holding.remove(&id);
                    report.disabled.push(id);
                    report.errors.push(StageError {
                        id,
                        stage: stage.name().to_owned(),
                        error,
                    });
                }
                error => {
                    log::warn!("Stage '{}' failed this frame: {error}", stage.name());
                    report.errors.push(StageError {
                        id,
                        stage: stage.name().to_owned(),
                        error,
                    });
                }
            }
        }

        self.device.end_frame()?;
        self.frame_index += 1;

        if let Some(fps) = self.fps.update()
            && self.settings.log_fps
        {
            log::debug!("{fps:.1} fps");
        }

        Ok(report)
    }

    /// Ends every acquisition held by the stages and hands cached programs
    /// back to the device; everything is freed at the next frame boundary.
    pub fn release_video_resources(&mut self) {
        for (_, stage) in self.sequence.stages_mut() {
            stage.release_video_resources();
        }
        self.holding.clear();
        self.shaders.release_programs(&self.device);
        let freed = self.device.collect_released();
        log::debug!("Released {freed} video resource(s)");
    }
}
