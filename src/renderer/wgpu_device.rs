//! wgpu Video Device
//!
//! Renders into an offscreen RGBA8 target with a 32-bit float depth buffer.
//! Draws submitted inside a pass are recorded and replayed into a single
//! `wgpu::RenderPass` when the pass ends; pipelines are cached per
//! `(program, render state, primitive)`.
//!
//! Sampled intensity formats without guaranteed filtering support
//! (`R16Unorm`, `R16Sint`, `R32Float`) are converted to `R16Float` on upload.
//! `R16Sint` texels are Hounsfield units and are converted to their
//! normalized intensity, which is what the volume shaders compare against.

use std::borrow::Cow;

use glam::{UVec3, Vec4};
use half::f16;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{
    ClearOp, DrawCall, MeshDesc, ProgramDesc, ReleaseQueue, ResourceId, TextureDesc, VideoDevice,
};
use crate::renderer::viewport::{Framebuffer, Viewport};
use crate::resources::mesh::{PrimitiveType, Vertex};
use crate::resources::render_state::RenderState;
use crate::resources::uniforms::UniformLayout;
use crate::volume::voxel::{Hounsfield, IntensityVoxel, TexelFormat};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn to_f16_bytes(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(|v| f16::from_f32(v).to_le_bytes()).collect()
}

/// Format a texel format is uploaded as.
fn upload_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TexelFormat::Rgba8Snorm => wgpu::TextureFormat::Rgba8Snorm,
        TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TexelFormat::R16Float | TexelFormat::R16Unorm | TexelFormat::R16Sint | TexelFormat::R32Float => {
            wgpu::TextureFormat::R16Float
        }
    }
}

/// Converts texel data to [`upload_format`].
fn upload_texels(format: TexelFormat, data: &[u8]) -> Cow<'_, [u8]> {
    match format {
        TexelFormat::R8Unorm | TexelFormat::R16Float | TexelFormat::Rgba8Snorm | TexelFormat::Rgba8Unorm => {
            Cow::Borrowed(data)
        }
        TexelFormat::R16Unorm => Cow::Owned(to_f16_bytes(
            data.chunks_exact(2)
                .map(|b| f32::from(u16::from_le_bytes([b[0], b[1]])) / f32::from(u16::MAX)),
        )),
        TexelFormat::R16Sint => Cow::Owned(to_f16_bytes(
            data.chunks_exact(2)
                .map(|b| Hounsfield::new(i16::from_le_bytes([b[0], b[1]])).intensity()),
        )),
        TexelFormat::R32Float => Cow::Owned(to_f16_bytes(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        )),
    }
}

fn extent(size: UVec3) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x,
        height: size.y,
        depth_or_array_layers: size.z,
    }
}

fn blend_state(state: RenderState) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor, operation| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation,
    };
    let uniform = |c: wgpu::BlendComponent| wgpu::BlendState { color: c, alpha: c };

    if state.contains(RenderState::BLEND_MAX) {
        Some(uniform(component(
            wgpu::BlendFactor::One,
            wgpu::BlendFactor::One,
            wgpu::BlendOperation::Max,
        )))
    } else if state.contains(RenderState::BLEND_ADDITIVE) {
        Some(uniform(component(
            wgpu::BlendFactor::One,
            wgpu::BlendFactor::One,
            wgpu::BlendOperation::Add,
        )))
    } else if state.contains(RenderState::BLEND) {
        Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING)
    } else {
        None
    }
}

fn topology(primitive: PrimitiveType) -> wgpu::PrimitiveTopology {
    match primitive {
        PrimitiveType::Triangles => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveType::Lines => wgpu::PrimitiveTopology::LineList,
        PrimitiveType::Points => wgpu::PrimitiveTopology::PointList,
    }
}

fn wgpu_color(color: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.x),
        g: f64::from(color.y),
        b: f64::from(color.z),
        a: f64::from(color.w),
    }
}

enum GpuResource {
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        format: TexelFormat,
        size: UVec3,
    },
    Mesh {
        vertices: wgpu::Buffer,
        indices: Option<wgpu::Buffer>,
        count: u32,
        primitive: PrimitiveType,
    },
    Program {
        module: wgpu::ShaderModule,
        bind_group_layout: wgpu::BindGroupLayout,
        pipeline_layout: wgpu::PipelineLayout,
        uniforms: UniformLayout,
        texture_slots: u32,
    },
}

struct Entry {
    label: String,
    bytes: usize,
    resource: GpuResource,
}

type PipelineKey = (ResourceId, RenderState, PrimitiveType);

struct PendingDraw {
    pipeline: PipelineKey,
    bind_group: wgpu::BindGroup,
    mesh: ResourceId,
}

struct OpenPass {
    label: String,
    clear: ClearOp,
    draws: Vec<PendingDraw>,
}

struct Target {
    size: (u32, u32),
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

/// [`VideoDevice`] backed by wgpu, rendering offscreen.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    resources: SlotMap<ResourceId, Entry>,
    release_queue: ReleaseQueue,
    release_receiver: flume::Receiver<ResourceId>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
    target: Option<Target>,
    viewport: Option<Viewport>,
    pass: Option<OpenPass>,
    memory_used: usize,
}

impl WgpuDevice {
    /// Requests a high performance adapter without a surface.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| VolumetraError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Volumetra Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        log::info!("wgpu adapter: {}", adapter.get_info().name);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let (release_queue, release_receiver) = ReleaseQueue::channel();
        Ok(Self {
            device,
            queue,
            resources: SlotMap::with_key(),
            release_queue,
            release_receiver,
            pipelines: FxHashMap::default(),
            sampler,
            target: None,
            viewport: None,
            pass: None,
            memory_used: 0,
        })
    }

    /// Bytes of video memory held by live textures and meshes.
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Reads the offscreen target back as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| VolumetraError::Framebuffer("nothing has been rendered yet".into()))?;
        let (width, height) = target.size;
        let row = width * 4;
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            extent(UVec3::new(width, height, 1)),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| VolumetraError::Framebuffer(format!("readback poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| VolumetraError::Framebuffer(format!("readback was dropped: {e}")))?
            .map_err(|e| VolumetraError::Framebuffer(format!("readback mapping failed: {e}")))?;

        let mut pixels = Vec::with_capacity((row * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&chunk[..row as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }

    fn ensure_target(&mut self, framebuffer: &Framebuffer) {
        let size = (framebuffer.width(), framebuffer.height());
        if self.target.as_ref().is_some_and(|t| t.size == size) {
            return;
        }
        let desc = |label, format, usage| wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(UVec3::new(size.0, size.1, 1)),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        };
        let color = self.device.create_texture(&desc(
            "Color Target",
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        ));
        let depth = self.device.create_texture(&desc(
            "Depth Target",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        ));
        self.target = Some(Target {
            size,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        });
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let (program, state, primitive) = key;
        let Some(Entry {
            label,
            resource: GpuResource::Program {
                module, pipeline_layout, ..
            },
            ..
        }) = self.resources.get(program)
        else {
            return Err(VolumetraError::ResourceAcquisition {
                label: format!("{program:?}"),
                reason: "draw program is not a live shader program".into(),
            });
        };

        let vertex_attributes = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &vertex_attributes,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: blend_state(state),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: topology(primitive),
                cull_mode: state
                    .contains(RenderState::CULL_BACK_FACE)
                    .then_some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: state.contains(RenderState::DEPTH_WRITE),
                depth_compare: if state.contains(RenderState::DEPTH_TEST) {
                    wgpu::CompareFunction::LessEqual
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn resource(&self, id: ResourceId, what: &str) -> Result<&Entry> {
        self.resources
            .get(id)
            .ok_or_else(|| VolumetraError::ResourceAcquisition {
                label: what.to_owned(),
                reason: format!("{what} {id:?} is not a live resource"),
            })
    }

    fn write_texels(&self, texture: &wgpu::Texture, size: UVec3, format: TexelFormat, data: &[u8]) {
        let texels = upload_texels(format, data);
        let bytes_per_texel = texels.len() / (size.x * size.y * size.z).max(1) as usize;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.x * bytes_per_texel as u32),
                rows_per_image: Some(size.y),
            },
            extent(size),
        );
    }
}

impl VideoDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn max_texture_3d_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_3d
    }

    fn release_queue(&self) -> ReleaseQueue {
        self.release_queue.clone()
    }

    fn collect_released(&mut self) -> usize {
        let mut freed = 0;
        for id in self.release_receiver.try_iter() {
            if let Some(entry) = self.resources.remove(id) {
                if let GpuResource::Texture { texture, .. } = &entry.resource {
                    texture.destroy();
                }
                self.pipelines.retain(|(program, ..), _| *program != id);
                self.memory_used -= entry.bytes;
                log::debug!("Released video resource '{}'", entry.label);
                freed += 1;
            }
        }
        freed
    }

    fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    fn create_texture_3d(&mut self, desc: &TextureDesc<'_>, data: &[u8]) -> Result<ResourceId> {
        let max = self.max_texture_3d_size();
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

        let format = upload_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: extent(desc.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.write_texels(&texture, desc.size, desc.format, data);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bytes = data.len();
        self.memory_used += bytes;
        Ok(self.resources.insert(Entry {
            label: desc.label.to_owned(),
            bytes,
            resource: GpuResource::Texture {
                texture,
                view,
                format: desc.format,
                size: desc.size,
            },
        }))
    }

    fn write_texture_3d(&mut self, id: ResourceId, data: &[u8]) -> Result<()> {
        let entry = self.resource(id, "texture")?;
        let GpuResource::Texture {
            texture, format, size, ..
        } = &entry.resource
        else {
            return Err(VolumetraError::ResourceAcquisition {
                label: entry.label.clone(),
                reason: "resource is not a texture".into(),
            });
        };
        if data.len() != entry.bytes {
            return Err(VolumetraError::ResourceAcquisition {
                label: entry.label.clone(),
                reason: format!("expected {} bytes of texel data, got {}", entry.bytes, data.len()),
            });
        }
        self.write_texels(texture, *size, *format, data);
        Ok(())
    }

    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> Result<ResourceId> {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(desc.label),
            contents: bytemuck::cast_slice(desc.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = (!desc.indices.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: bytemuck::cast_slice(desc.indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let count = if desc.indices.is_empty() {
            desc.vertices.len()
        } else {
            desc.indices.len()
        } as u32;

        let bytes = std::mem::size_of_val(desc.vertices) + std::mem::size_of_val(desc.indices);
        self.memory_used += bytes;
        Ok(self.resources.insert(Entry {
            label: desc.label.to_owned(),
            bytes,
            resource: GpuResource::Mesh {
                vertices,
                indices,
                count,
                primitive: desc.primitive,
            },
        }))
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ResourceId> {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.source_name),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
        });
        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<_> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(VolumetraError::ShaderCompilation {
                source_name: desc.source_name.to_owned(),
                message: errors.join("\n"),
            });
        }

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for slot in 0..desc.texture_slots {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + 2 * slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D3,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + 2 * slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.source_name),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.source_name),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        Ok(self.resources.insert(Entry {
            label: desc.source_name.to_owned(),
            bytes: 0,
            resource: GpuResource::Program {
                module,
                bind_group_layout,
                pipeline_layout,
                uniforms: desc.uniforms.clone(),
                texture_slots: desc.texture_slots,
            },
        }))
    }

    /// Clears the whole offscreen target, depth included.
    fn begin_frame(&mut self, framebuffer: &Framebuffer, viewport: &Viewport, clear_color: Vec4) -> Result<()> {
        viewport.validate(framebuffer)?;
        self.ensure_target(framebuffer);
        self.viewport = Some(*viewport);
        self.pass = None;

        let Some(target) = &self.target else {
            return Err(VolumetraError::Framebuffer("no render target".into()));
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Clear") });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Frame Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu_color(clear_color)),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn begin_pass(&mut self, label: &str, clear: ClearOp) -> Result<()> {
        if self.viewport.is_none() {
            return Err(VolumetraError::Framebuffer(format!("pass '{label}' begun outside a frame")));
        }
        self.pass = Some(OpenPass {
            label: label.to_owned(),
            clear,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        if self.pass.is_none() {
            return Err(VolumetraError::Framebuffer("draw submitted outside a pass".into()));
        }
        let GpuResource::Mesh { primitive, .. } = self.resource(call.mesh, "mesh")?.resource else {
            return Err(VolumetraError::ResourceAcquisition {
                label: format!("{:?}", call.mesh),
                reason: "draw mesh is not a mesh".into(),
            });
        };
        let key = (call.program, call.state, primitive);
        self.ensure_pipeline(key)?;

        let program = self.resource(call.program, "program")?;
        let GpuResource::Program {
            bind_group_layout,
            uniforms,
            texture_slots,
            ..
        } = &program.resource
        else {
            return Err(VolumetraError::ResourceAcquisition {
                label: program.label.clone(),
                reason: "draw program is not a shader program".into(),
            });
        };
        if call.textures.len() != *texture_slots as usize {
            return Err(VolumetraError::ResourceAcquisition {
                label: program.label.clone(),
                reason: format!(
                    "program samples {texture_slots} texture(s), draw binds {}",
                    call.textures.len()
                ),
            });
        }

        let (block, mismatched) = uniforms.pack(call.uniforms);
        if !mismatched.is_empty() {
            log::warn!("'{}': uniform type mismatch for {mismatched:?}", program.label);
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&program.label),
            contents: &block,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut views = Vec::with_capacity(call.textures.len());
        for &id in call.textures {
            match &self.resource(id, "texture")?.resource {
                GpuResource::Texture { view, .. } => views.push(view),
                _ => {
                    return Err(VolumetraError::ResourceAcquisition {
                        label: format!("{id:?}"),
                        reason: "bound resource is not a texture".into(),
                    });
                }
            }
        }
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }];
        for (slot, view) in (0u32..).zip(views) {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + 2 * slot,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + 2 * slot,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: bind_group_layout,
            entries: &entries,
        });

        if let Some(pass) = &mut self.pass {
            pass.draws.push(PendingDraw {
                pipeline: key,
                bind_group,
                mesh: call.mesh,
            });
        }
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        let Some(pass) = self.pass.take() else {
            return Err(VolumetraError::Framebuffer("no pass to end".into()));
        };
        let (Some(target), Some(viewport)) = (&self.target, self.viewport) else {
            return Err(VolumetraError::Framebuffer("no render target".into()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&pass.label) });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: pass
                            .clear
                            .color
                            .map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(wgpu_color(c))),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: if pass.clear.depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            render_pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );

            for draw in &pass.draws {
                let (Some(pipeline), Some(Entry {
                    resource: GpuResource::Mesh {
                        vertices, indices, count, ..
                    },
                    ..
                })) = (self.pipelines.get(&draw.pipeline), self.resources.get(draw.mesh))
                else {
                    continue;
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &draw.bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                match indices {
                    Some(indices) => {
                        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..*count, 0, 0..1);
                    }
                    None => render_pass.draw(0..*count, 0..1),
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn is_pass_open(&self) -> bool {
        self.pass.is_some()
    }

    fn end_frame(&mut self) -> Result<()> {
        if self.pass.is_some() {
            self.end_pass()?;
        }
        self.viewport = None;
        Ok(())
    }
}
