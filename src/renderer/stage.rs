//! Render Stage Definitions
//!
//! A [`RenderStage`] is one step of the frame pipeline. Each frame the
//! [`FrameRenderer`](super::FrameRenderer) calls, for every enabled stage in
//! sequence order:
//!
//! 1. [`RenderStage::prepare_frame`]
//! 2. [`RenderStage::update_render_queues`]
//! 3. [`RenderStage::render_pass`]
//!
//! A stage must set all the GPU state it relies on in its own draw calls;
//! nothing is inherited from the stage before it.

use std::any::Any;

use glam::Mat4;

use crate::errors::Result;
use crate::renderer::device::VideoDevice;
use crate::renderer::shader_manager::ShaderManager;
use crate::renderer::viewport::Viewport;
use crate::resources::feature::UploadContext;
use crate::scene::{NodeHandle, Scene};

/// Canonical position of a stage in the pipeline.
///
/// Used by [`StageOrder`](crate::helpers::StageOrder) to arrange stages;
/// a [`RenderStageSequence`](super::RenderStageSequence) itself always runs
/// stages in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StageCategory {
    /// Off-screen helpers such as object picking.
    PreProcess = 0,
    /// Opaque meshes, drawn front to back.
    Opaque = 1,
    /// Blended meshes, drawn back to front.
    Transparent = 2,
    /// Ray-marched volumes, composited back to front.
    Volume = 3,
    /// Screen-space overlays, usually with a fixed view transform.
    Overlay = 4,
}

impl StageCategory {
    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreProcess => "PreProcess",
            Self::Opaque => "Opaque",
            Self::Transparent => "Transparent",
            Self::Volume => "Volume",
            Self::Overlay => "Overlay",
        }
    }
}

/// Enabled / fixed-view state shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageState {
    pub enabled: bool,
    pub view_transform_fixed: bool,
    /// View the stage renders with while `view_transform_fixed` is set.
    pub frozen_view: Option<Mat4>,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            enabled: true,
            view_transform_fixed: false,
            frozen_view: None,
        }
    }
}

/// Draw statistics of one stage pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub draw_calls: usize,
    /// Geometries that matched but could not be drawn (missing feature role
    /// or failed resource acquisition).
    pub skipped: usize,
}

/// Collaborators lent to a stage for one frame.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn VideoDevice,
    pub shaders: &'a mut ShaderManager,
    pub viewport: Viewport,
    pub frame_index: u64,
}

impl FrameContext<'_> {
    /// Reborrows the device and shader manager for feature uploads.
    pub fn upload_context(&mut self) -> UploadContext<'_> {
        UploadContext {
            device: &mut *self.device,
            shaders: &mut *self.shaders,
        }
    }
}

/// One step of the frame pipeline.
pub trait RenderStage: Any {
    /// Name used in logs, frame reports and device pass labels.
    fn name(&self) -> &str;

    fn category(&self) -> StageCategory;

    fn state(&self) -> &StageState;

    fn state_mut(&mut self) -> &mut StageState;

    fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Disabled stages are skipped entirely: no queue update, no draws.
    fn set_enabled(&mut self, enabled: bool) {
        self.state_mut().enabled = enabled;
    }

    fn is_view_transform_fixed(&self) -> bool {
        self.state().view_transform_fixed
    }

    /// Freezes (or unfreezes) the view transform. While frozen, the stage
    /// keeps rendering with the view of the first frame after freezing.
    fn set_view_transform_fixed(&mut self, fixed: bool) {
        let state = self.state_mut();
        state.view_transform_fixed = fixed;
        if !fixed {
            state.frozen_view = None;
        }
    }

    /// View this stage renders with, given the camera's current view.
    fn effective_view(&mut self, camera_view: Mat4) -> Mat4 {
        let state = self.state_mut();
        if !state.view_transform_fixed {
            return camera_view;
        }
        *state.frozen_view.get_or_insert(camera_view)
    }

    /// Stage-specific per-frame setup.
    fn prepare_frame(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Rebuilds the stage's queues from the scene below `root`.
    fn update_render_queues(&mut self, scene: &Scene, root: NodeHandle, view: Mat4);

    /// Draws everything queued for this frame.
    fn render_pass(&mut self, ctx: &mut FrameContext<'_>, view: Mat4, projection: Mat4) -> Result<StageStats>;

    /// Ends every acquisition the stage holds.
    fn release_video_resources(&mut self);
}
