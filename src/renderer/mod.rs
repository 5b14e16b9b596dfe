//! Renderer
//!
//! Multi-stage rendering of a [`Scene`](crate::scene::Scene):
//!
//! - [`RenderQueue`]: geometries of one geometry type, ordered per stage
//! - [`RenderStage`] / [`GeometryStage`]: one pass of the frame
//! - [`RenderStageSequence`]: stages in execution order
//! - [`FrameRenderer`]: runs the sequence into a framebuffer
//!
//! The GPU sits behind the [`VideoDevice`] trait. [`HeadlessDevice`] records
//! commands without a GPU; `WgpuDevice` (feature `wgpu`) renders offscreen.

pub mod device;
pub mod frame;
pub mod geometry_stage;
pub mod headless;
pub mod queue;
pub mod sequence;
pub mod settings;
pub mod shader_manager;
pub mod stage;
pub mod stages;
pub mod viewport;
#[cfg(feature = "wgpu")]
pub mod wgpu_device;

pub use device::{ClearOp, DrawCall, MeshDesc, ProgramDesc, ReleaseQueue, ResourceId, TextureDesc, VideoDevice};
pub use frame::{FrameRenderer, FrameReport, StageError, StageReport};
pub use geometry_stage::{DrawItem, GeometryRenderer, GeometryStage};
pub use headless::{Command, HeadlessDevice, RecordedDraw, RecordedResource, ResourceKind};
pub use queue::{RenderOrder, RenderQueue, Renderable};
pub use sequence::{RenderStageSequence, StageId};
pub use settings::RendererSettings;
pub use shader_manager::{ProgramRequest, ShaderManager};
pub use stage::{FrameContext, RenderStage, StageCategory, StageState, StageStats};
pub use stages::{
    CUTTING_PLANE_SHADER, CuttingPlanesRenderer, CuttingPlanesStage, DrrSettings, DvrSettings, MaskSettings,
    MeshPickingRenderer, MeshPickingStage, MeshRenderer, MeshRenderingStage, VOLUME_SHADER, VolumeMode,
    VolumeRenderer, VolumeRenderingStage,
};
pub use viewport::{Framebuffer, Viewport};
#[cfg(feature = "wgpu")]
pub use wgpu_device::WgpuDevice;
