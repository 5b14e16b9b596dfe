//! Video Device Abstraction
//!
//! [`VideoDevice`] is the seam between the engine core and the GPU. The core
//! only ever talks to the device through this trait: uploading textures and
//! meshes, compiling shader programs, and submitting fully specified draw
//! calls inside stage passes.
//!
//! Two implementations ship with the crate:
//! - [`HeadlessDevice`](super::HeadlessDevice): records every command, used by
//!   tests and offscreen tooling
//! - `WgpuDevice` (feature `wgpu`): renders into an offscreen wgpu texture
//!
//! # Deferred release
//!
//! Video resources are not freed synchronously. When the last acquisition of
//! a geometry feature ends, its [`ResourceId`] is posted to the device's
//! [`ReleaseQueue`]; the device frees everything queued at the next frame
//! boundary ([`VideoDevice::collect_released`]).

use glam::{UVec3, Vec4};
use slotmap::new_key_type;

use crate::errors::Result;
use crate::renderer::viewport::{Framebuffer, Viewport};
use crate::resources::mesh::{PrimitiveType, Vertex};
use crate::resources::render_state::RenderState;
use crate::resources::uniforms::{UniformLayout, UniformValues};
use crate::volume::voxel::TexelFormat;

new_key_type! {
    /// Handle of a resource living in video memory.
    pub struct ResourceId;
}

/// Sending half of a device's deferred-release channel.
#[derive(Debug, Clone)]
pub struct ReleaseQueue {
    sender: flume::Sender<ResourceId>,
}

impl ReleaseQueue {
    /// Creates a queue and the receiver the owning device drains.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<ResourceId>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Schedules `id` for release at the next frame boundary.
    pub fn release(&self, id: ResourceId) {
        if self.sender.send(id).is_err() {
            log::debug!("Video device dropped before resource {id:?} could be released");
        }
    }
}

/// Description of a 3D texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub size: UVec3,
    pub format: TexelFormat,
}

impl TextureDesc<'_> {
    /// Number of bytes the texel data must have.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.size.x as usize * self.size.y as usize * self.size.z as usize * self.format.bytes_per_texel()
    }
}

/// Description of a mesh upload.
#[derive(Debug, Clone, Copy)]
pub struct MeshDesc<'a> {
    pub label: &'a str,
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub primitive: PrimitiveType,
}

/// A shader program ready for compilation.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    /// Name of the shader source, reported on compilation failure.
    pub source_name: &'a str,
    /// Final (template-expanded) shader source.
    pub source: &'a str,
    /// Layout of the program's uniform block.
    pub uniforms: &'a UniformLayout,
    /// Number of 3D texture slots the program samples.
    pub texture_slots: u32,
}

/// Clear operation performed at the start of a stage pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOp {
    /// Clears color to this value, if set.
    pub color: Option<Vec4>,
    pub depth: bool,
}

impl ClearOp {
    pub const NONE: Self = Self {
        color: None,
        depth: false,
    };
    pub const DEPTH: Self = Self {
        color: None,
        depth: true,
    };
}

/// A fully specified draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ResourceId,
    pub mesh: ResourceId,
    pub state: RenderState,
    /// Texture per slot, in slot order.
    pub textures: &'a [ResourceId],
    pub uniforms: &'a UniformValues,
}

/// GPU collaborator of the engine.
pub trait VideoDevice {
    /// Short name of the backend, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Largest supported 3D texture side length.
    fn max_texture_3d_size(&self) -> u32;

    /// Queue through which released resources are handed back to the device.
    fn release_queue(&self) -> ReleaseQueue;

    /// Frees every resource posted to the release queue; returns how many were freed.
    fn collect_released(&mut self) -> usize;

    /// Whether `id` refers to a live resource.
    fn contains(&self, id: ResourceId) -> bool;

    fn create_texture_3d(&mut self, desc: &TextureDesc<'_>, data: &[u8]) -> Result<ResourceId>;

    /// Replaces the whole content of an existing texture.
    fn write_texture_3d(&mut self, id: ResourceId, data: &[u8]) -> Result<()>;

    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> Result<ResourceId>;

    /// Compiles a program. Fails with `ShaderCompilation` naming `desc.source_name`.
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ResourceId>;

    /// Starts a frame targeting `viewport` of `framebuffer`; clears the viewport to `clear_color`.
    fn begin_frame(&mut self, framebuffer: &Framebuffer, viewport: &Viewport, clear_color: Vec4) -> Result<()>;

    /// Opens a pass attributed to the stage `label`.
    fn begin_pass(&mut self, label: &str, clear: ClearOp) -> Result<()>;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    fn end_pass(&mut self) -> Result<()>;

    /// Whether a pass was begun and not yet ended.
    fn is_pass_open(&self) -> bool;

    /// Composites the frame into the framebuffer.
    fn end_frame(&mut self) -> Result<()>;
}
