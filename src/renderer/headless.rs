//! Headless Video Device
//!
//! [`HeadlessDevice`] keeps every resource in host memory and records the
//! commands it receives instead of rasterizing them. It enforces the same
//! contracts a GPU backend does (texture size limits, video memory budget,
//! draws only inside passes, live handles only), which makes it the device
//! of choice for tests and for offscreen tooling that inspects what a frame
//! would draw.

use glam::{UVec3, Vec4};
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{
    ClearOp, DrawCall, MeshDesc, ProgramDesc, ReleaseQueue, ResourceId, TextureDesc, VideoDevice,
};
use crate::renderer::settings::RendererSettings;
use crate::renderer::viewport::{Framebuffer, Viewport};
use crate::resources::mesh::PrimitiveType;
use crate::resources::render_state::RenderState;
use crate::resources::uniforms::UniformValue;
use crate::volume::voxel::TexelFormat;

/// Default largest 3D texture side, matching common desktop GPUs.
pub const DEFAULT_MAX_TEXTURE_3D_SIZE: u32 = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Texture3d {
        size: UVec3,
        format: TexelFormat,
        data: Vec<u8>,
    },
    Mesh {
        vertex_count: usize,
        index_count: usize,
        primitive: PrimitiveType,
    },
    Program {
        source_name: String,
        source: String,
        texture_slots: u32,
    },
}

/// A live resource of a [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResource {
    pub label: String,
    pub kind: ResourceKind,
    /// Video memory accounted for the resource.
    pub bytes: usize,
    /// Number of content updates after creation.
    pub writes: u32,
}

impl RecordedResource {
    #[must_use]
    pub fn is_texture(&self) -> bool {
        matches!(self.kind, ResourceKind::Texture3d { .. })
    }

    #[must_use]
    pub fn is_program(&self) -> bool {
        matches!(self.kind, ResourceKind::Program { .. })
    }
}

/// A draw call as it was submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    /// Label of the pass the draw belongs to.
    pub pass: String,
    pub program: ResourceId,
    pub mesh: ResourceId,
    pub state: RenderState,
    pub textures: Vec<ResourceId>,
    /// Uniform values sorted by name.
    pub uniforms: Vec<(String, UniformValue)>,
}

impl RecordedDraw {
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|index| self.uniforms[index].1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame {
        framebuffer: Framebuffer,
        viewport: Viewport,
        clear_color: Vec4,
    },
    BeginPass {
        label: String,
        clear: ClearOp,
    },
    Draw(RecordedDraw),
    EndPass,
    EndFrame,
}

/// Recording [`VideoDevice`] without a GPU.
pub struct HeadlessDevice {
    resources: SlotMap<ResourceId, RecordedResource>,
    release_queue: ReleaseQueue,
    release_receiver: flume::Receiver<ResourceId>,
    released: Vec<String>,

    commands: Vec<Command>,
    current_pass: Option<String>,
    in_frame: bool,

    memory_budget: Option<usize>,
    memory_used: usize,
    max_texture_3d_size: u32,
    rejected_sources: FxHashSet<String>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        let (release_queue, release_receiver) = ReleaseQueue::channel();
        Self {
            resources: SlotMap::with_key(),
            release_queue,
            release_receiver,
            released: Vec::new(),
            commands: Vec::new(),
            current_pass: None,
            in_frame: false,
            memory_budget: None,
            memory_used: 0,
            max_texture_3d_size: DEFAULT_MAX_TEXTURE_3D_SIZE,
            rejected_sources: FxHashSet::default(),
        }
    }

    /// Device honoring the video memory budget of `settings`.
    #[must_use]
    pub fn from_settings(settings: &RendererSettings) -> Self {
        let mut device = Self::new();
        device.memory_budget = settings.video_memory_budget;
        device
    }

    /// Limits the total size of live resources to `bytes`.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_max_texture_3d_size(mut self, size: u32) -> Self {
        self.max_texture_3d_size = size;
        self
    }

    /// Makes every later compilation of `source_name` fail.
    pub fn reject_shader(&mut self, source_name: &str) {
        self.rejected_sources.insert(source_name.to_owned());
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the recorded commands and starts a fresh log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Every recorded draw, in submission order.
    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Number of draws recorded inside passes labeled `pass`.
    #[must_use]
    pub fn draw_count(&self, pass: &str) -> usize {
        self.draws().filter(|draw| draw.pass == pass).count()
    }

    /// Labels of the passes recorded, in order.
    #[must_use]
    pub fn pass_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::BeginPass { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn resource(&self, id: ResourceId) -> Option<&RecordedResource> {
        self.resources.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &RecordedResource)> {
        self.resources.iter()
    }

    #[must_use]
    pub fn live_resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Labels of every resource freed so far, in release order.
    #[must_use]
    pub fn released(&self) -> &[String] {
        &self.released
    }

    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    fn reserve(&mut self, label: &str, bytes: usize) -> Result<()> {
        if let Some(budget) = self.memory_budget
            && self.memory_used + bytes > budget
        {
            return Err(VolumetraError::ResourceAcquisition {
                label: label.to_owned(),
                reason: format!(
                    "out of video memory ({bytes} bytes requested, {} of {budget} in use)",
                    self.memory_used
                ),
            });
        }
        self.memory_used += bytes;
        Ok(())
    }

    fn insert(&mut self, label: &str, kind: ResourceKind, bytes: usize) -> Result<ResourceId> {
        self.reserve(label, bytes)?;
        Ok(self.resources.insert(RecordedResource {
            label: label.to_owned(),
            kind,
            bytes,
            writes: 0,
        }))
    }

    fn live(&self, id: ResourceId, what: &str) -> Result<&RecordedResource> {
        self.resources
            .get(id)
            .ok_or_else(|| VolumetraError::ResourceAcquisition {
                label: what.to_owned(),
                reason: format!("{what} {id:?} is not a live resource"),
            })
    }
}

impl VideoDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn max_texture_3d_size(&self) -> u32 {
        self.max_texture_3d_size
    }

    fn release_queue(&self) -> ReleaseQueue {
        self.release_queue.clone()
    }

    fn collect_released(&mut self) -> usize {
        let mut freed = 0;
        for id in self.release_receiver.try_iter() {
            if let Some(resource) = self.resources.remove(id) {
                self.memory_used -= resource.bytes;
                self.released.push(resource.label);
                freed += 1;
            }
        }
        freed
    }

    fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    fn create_texture_3d(&mut self, desc: &TextureDesc<'_>, data: &[u8]) -> Result<ResourceId> {
        let max = self.max_texture_3d_size;
        if desc.size.max_element() > max || desc.size.min_element() == 0 {
            return Err(VolumetraError::ResourceAcquisition {
                label: desc.label.to_owned(),
                reason: format!("texture size {} outside 1..={max}", desc.size),
            });
        }
        if data.len() != desc.byte_size() {
            return Err(VolumetraError::ResourceAcquisition {
                label: desc.label.to_owned(),
                reason: format!("expected {} bytes of texel data, got {}", desc.byte_size(), data.len()),
            });
        }
        let kind = ResourceKind::Texture3d {
            size: desc.size,
            format: desc.format,
            data: data.to_vec(),
        };
        self.insert(desc.label, kind, data.len())
    }

    fn write_texture_3d(&mut self, id: ResourceId, data: &[u8]) -> Result<()> {
        let Some(resource) = self.resources.get_mut(id) else {
            return Err(VolumetraError::ResourceAcquisition {
                label: format!("{id:?}"),
                reason: "texture is not a live resource".into(),
            });
        };
        match &mut resource.kind {
            ResourceKind::Texture3d { data: texels, .. } if texels.len() == data.len() => {
                texels.copy_from_slice(data);
                resource.writes += 1;
                Ok(())
            }
            ResourceKind::Texture3d { data: texels, .. } => Err(VolumetraError::ResourceAcquisition {
                label: resource.label.clone(),
                reason: format!("expected {} bytes of texel data, got {}", texels.len(), data.len()),
            }),
            _ => Err(VolumetraError::ResourceAcquisition {
                label: resource.label.clone(),
                reason: "resource is not a texture".into(),
            }),
        }
    }

    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> Result<ResourceId> {
        let bytes = std::mem::size_of_val(desc.vertices) + std::mem::size_of_val(desc.indices);
        let kind = ResourceKind::Mesh {
            vertex_count: desc.vertices.len(),
            index_count: desc.indices.len(),
            primitive: desc.primitive,
        };
        self.insert(desc.label, kind, bytes)
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ResourceId> {
        let failure = if self.rejected_sources.contains(desc.source_name) {
            Some("rejected by the device".to_owned())
        } else {
            ["fn vs_main", "fn fs_main"]
                .into_iter()
                .find(|entry| !desc.source.contains(entry))
                .map(|entry| format!("missing entry point `{}`", &entry[3..]))
        };
        if let Some(message) = failure {
            return Err(VolumetraError::ShaderCompilation {
                source_name: desc.source_name.to_owned(),
                message,
            });
        }

        let kind = ResourceKind::Program {
            source_name: desc.source_name.to_owned(),
            source: desc.source.to_owned(),
            texture_slots: desc.texture_slots,
        };
        self.insert(desc.source_name, kind, 0)
    }

    fn begin_frame(&mut self, framebuffer: &Framebuffer, viewport: &Viewport, clear_color: Vec4) -> Result<()> {
        viewport.validate(framebuffer)?;
        if self.in_frame {
            log::warn!("Frame started while the previous one was still open");
        }
        self.in_frame = true;
        self.current_pass = None;
        self.commands.push(Command::BeginFrame {
            framebuffer: *framebuffer,
            viewport: *viewport,
            clear_color,
        });
        Ok(())
    }

    fn begin_pass(&mut self, label: &str, clear: ClearOp) -> Result<()> {
        if !self.in_frame {
            return Err(VolumetraError::Framebuffer(format!("pass '{label}' begun outside a frame")));
        }
        if let Some(open) = &self.current_pass {
            return Err(VolumetraError::Framebuffer(format!(
                "pass '{label}' begun while '{open}' is still open"
            )));
        }
        self.current_pass = Some(label.to_owned());
        self.commands.push(Command::BeginPass {
            label: label.to_owned(),
            clear,
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let Some(pass) = self.current_pass.clone() else {
            return Err(VolumetraError::Framebuffer("draw submitted outside a pass".into()));
        };

        let program = self.live(call.program, "program")?;
        let ResourceKind::Program { texture_slots, .. } = program.kind else {
            return Err(VolumetraError::ResourceAcquisition {
                label: program.label.clone(),
                reason: "draw program is not a shader program".into(),
            });
        };
        if call.textures.len() != texture_slots as usize {
            return Err(VolumetraError::ResourceAcquisition {
                label: program.label.clone(),
                reason: format!(
                    "program samples {texture_slots} texture(s), draw binds {}",
                    call.textures.len()
                ),
            });
        }
        self.live(call.mesh, "mesh")?;
        for &texture in call.textures {
            self.live(texture, "texture")?;
        }

        let mut uniforms: Vec<_> = call
            .uniforms
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        uniforms.sort_by(|a, b| a.0.cmp(&b.0));

        self.commands.push(Command::Draw(RecordedDraw {
            pass,
            program: call.program,
            mesh: call.mesh,
            state: call.state,
            textures: call.textures.to_vec(),
            uniforms,
        }));
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        if self.current_pass.take().is_none() {
            return Err(VolumetraError::Framebuffer("no pass to end".into()));
        }
        self.commands.push(Command::EndPass);
        Ok(())
    }

    fn is_pass_open(&self) -> bool {
        self.current_pass.is_some()
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(VolumetraError::Framebuffer("no frame to end".into()));
        }
        if let Some(open) = self.current_pass.take() {
            log::warn!("Pass '{open}' still open at the end of the frame");
            self.commands.push(Command::EndPass);
        }
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}
