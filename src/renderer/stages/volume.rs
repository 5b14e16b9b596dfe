//! Volume Rendering
//!
//! Ray marching through volume segments. Every segment geometry is drawn as
//! a unit box (scaled by the geometry's transform to the segment's extent);
//! the fragment shader marches from the box surface through the segment's
//! intensity texture. Segments are composited back to front.
//!
//! Four modes are supported:
//!
//! | Mode | Compositing | Sampled role | Extra inputs |
//! |------|-------------|--------------|--------------|
//! | [`VolumeMode::Mip`] | per-channel maximum | intensities | none |
//! | [`VolumeMode::Dvr`] | front-to-back "over" within a segment, blended back to front | intensities | color map, optional normals |
//! | [`VolumeMode::Drr`] | additive line integral of attenuation | intensities | none |
//! | [`VolumeMode::Mask`] | first masked sample, depth tested | mask | none |

use std::fmt;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{DrawCall, ResourceId};
use crate::renderer::geometry_stage::{DrawItem, GeometryRenderer, GeometryStage};
use crate::renderer::queue::{RenderOrder, RenderQueue};
use crate::renderer::settings::RendererSettings;
use crate::renderer::shader_manager::ProgramRequest;
use crate::renderer::stage::{FrameContext, StageCategory};
use crate::resources::color_map::{ColorMap, ColorMapTexture, SharedColorMap};
use crate::resources::feature::{GeometryFeature, VideoResource};
use crate::resources::mesh::MeshFactory;
use crate::resources::render_state::RenderState;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::{UniformLayout, UniformType, UniformValues};
use crate::volume::voxel::{Hounsfield, IntensityVoxel};

/// Name of the built-in ray marching source.
pub const VOLUME_SHADER: &str = "volume";

/// Direct volume rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DvrSettings {
    /// Scales down the opacity of every sample; higher is more transparent.
    pub translucence: f32,
    /// Weight of diffuse lighting; only used with normals.
    pub diffuse_light: f32,
    /// Shades samples using the geometry's normals feature, if present.
    pub lighting: bool,
}

impl Default for DvrSettings {
    fn default() -> Self {
        Self {
            translucence: 50.0,
            diffuse_light: 1.0,
            lighting: true,
        }
    }
}

/// Digitally reconstructed radiograph parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrrSettings {
    /// Attenuation of water per unit of ray length.
    pub water_attenuation: f32,
    /// Brightness of the accumulated attenuation.
    pub base_intensity: f32,
    /// Samples below this value (HU) do not attenuate.
    pub lower_threshold: i16,
    /// Samples above this value (HU) attenuate `upper_multiplier` times stronger.
    pub upper_threshold: i16,
    pub upper_multiplier: f32,
}

impl Default for DrrSettings {
    fn default() -> Self {
        Self {
            water_attenuation: 5e-3,
            base_intensity: 1.0,
            lower_threshold: -400,
            upper_threshold: 400,
            upper_multiplier: 1.5,
        }
    }
}

/// Mask rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskSettings {
    /// RGBA of masked voxels.
    pub color: [f32; 4],
    /// Draws whole masked regions; otherwise only their outlines.
    pub filling: bool,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            color: [0.0, 1.0, 0.0, 1.0],
            filling: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    /// Maximum intensity projection.
    Mip,
    /// Direct volume rendering through a color map.
    Dvr(DvrSettings),
    /// Digitally reconstructed radiograph.
    Drr(DrrSettings),
    /// Binary mask; voxels above one half count as masked.
    Mask(MaskSettings),
}

impl VolumeMode {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mip => "MIP",
            Self::Dvr(_) => "DVR",
            Self::Drr(_) => "DRR",
            Self::Mask(_) => "MASK",
        }
    }

    fn render_state(&self) -> RenderState {
        let blend = match self {
            Self::Mip => RenderState::BLEND_MAX,
            Self::Dvr(_) => RenderState::BLEND,
            Self::Drr(_) => RenderState::BLEND_ADDITIVE,
            Self::Mask(mask) if mask.filling => RenderState::DEPTH_WRITE,
            Self::Mask(_) => RenderState::BLEND,
        };
        RenderState::DEPTH_TEST | RenderState::CULL_BACK_FACE | blend
    }

    fn uniform_layout(&self) -> UniformLayout {
        let mut members = vec![
            ("model_view", UniformType::Mat4),
            ("projection", UniformType::Mat4),
            ("model_view_projection", UniformType::Mat4),
            ("model_view_inverse", UniformType::Mat4),
            ("step_length", UniformType::Float),
        ];
        match self {
            Self::Mip => {}
            Self::Dvr(_) => {
                members.push(("translucence", UniformType::Float));
                members.push(("diffuse_light", UniformType::Float));
            }
            Self::Drr(_) => {
                members.push(("water_attenuation", UniformType::Float));
                members.push(("base_intensity", UniformType::Float));
                members.push(("lower_threshold", UniformType::Float));
                members.push(("upper_threshold", UniformType::Float));
                members.push(("upper_multiplier", UniformType::Float));
            }
            Self::Mask(_) => members.push(("color", UniformType::Vec4)),
        }
        UniformLayout::new(members)
    }

    fn insert_uniforms(&self, values: &mut UniformValues) {
        match *self {
            Self::Mip => {}
            Self::Dvr(dvr) => {
                values.insert("translucence".into(), dvr.translucence.into());
                values.insert("diffuse_light".into(), dvr.diffuse_light.into());
            }
            Self::Drr(drr) => {
                values.insert("water_attenuation".into(), drr.water_attenuation.into());
                values.insert("base_intensity".into(), drr.base_intensity.into());
                values.insert(
                    "lower_threshold".into(),
                    Hounsfield::new(drr.lower_threshold).intensity().into(),
                );
                values.insert(
                    "upper_threshold".into(),
                    Hounsfield::new(drr.upper_threshold).intensity().into(),
                );
                values.insert("upper_multiplier".into(), drr.upper_multiplier.into());
            }
            Self::Mask(mask) => {
                values.insert("color".into(), Vec4::from_array(mask.color).into());
            }
        }
    }
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ray marching draw logic of a [`VolumeRenderingStage`].
pub struct VolumeRenderer {
    mode: VolumeMode,
    layout: UniformLayout,
    intensities_role: [u32; 1],
    normals_role: [u32; 1],
    mask_role: [u32; 1],
    sample_rate: u32,

    proxy: GeometryFeature,
    proxy_resource: Option<VideoResource>,
    color_map: SharedColorMap,
    color_map_feature: GeometryFeature,
    color_map_resource: Option<VideoResource>,

    // Indexed by "uses normals"; resolved once per pass.
    programs: [Option<ResourceId>; 2],
}

impl VolumeRenderer {
    pub const ROLE_INTENSITIES: u32 = 0;
    pub const ROLE_NORMALS: u32 = 1;
    pub const ROLE_MASK: u32 = 2;
    /// Samples per unit of segment extent.
    pub const DEFAULT_SAMPLE_RATE: u32 = 200;

    pub fn new(mode: VolumeMode) -> Result<Self> {
        let proxy = GeometryFeature::new(MeshFactory::create_box(Vec3::ONE)?);
        let color_map = ColorMap::default().into_shared();
        let color_map_feature = GeometryFeature::new(ColorMapTexture::new("color map", color_map.clone()));
        Ok(Self {
            mode,
            layout: mode.uniform_layout(),
            intensities_role: [Self::ROLE_INTENSITIES],
            normals_role: [Self::ROLE_NORMALS],
            mask_role: [Self::ROLE_MASK],
            sample_rate: Self::DEFAULT_SAMPLE_RATE,
            proxy,
            proxy_resource: None,
            color_map,
            color_map_feature,
            color_map_resource: None,
            programs: [None; 2],
        })
    }

    #[must_use]
    pub fn mode(&self) -> &VolumeMode {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: VolumeMode) {
        self.mode = mode;
        self.layout = mode.uniform_layout();
        self.programs = [None; 2];
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(VolumetraError::Configuration("sample rate must be positive".into()));
        }
        self.sample_rate = sample_rate;
        Ok(())
    }

    #[must_use]
    pub fn intensities_role(&self) -> u32 {
        self.intensities_role[0]
    }

    pub fn set_intensities_role(&mut self, role: u32) {
        self.intensities_role = [role];
    }

    #[must_use]
    pub fn normals_role(&self) -> u32 {
        self.normals_role[0]
    }

    pub fn set_normals_role(&mut self, role: u32) {
        self.normals_role = [role];
    }

    #[must_use]
    pub fn mask_role(&self) -> u32 {
        self.mask_role[0]
    }

    pub fn set_mask_role(&mut self, role: u32) {
        self.mask_role = [role];
    }

    /// Role of the volume texture the current mode marches through.
    fn sampled_role(&self) -> &[u32; 1] {
        match self.mode {
            VolumeMode::Mask(_) => &self.mask_role,
            _ => &self.intensities_role,
        }
    }

    /// Color map used by DVR. Edits are uploaded before the next pass.
    #[must_use]
    pub fn color_map(&self) -> &SharedColorMap {
        &self.color_map
    }

    fn uses_normals(&self, item: &DrawItem<'_>) -> Option<ResourceId> {
        match self.mode {
            VolumeMode::Dvr(dvr) if dvr.lighting => item.resource(self.normals_role()),
            _ => None,
        }
    }

    fn texture_slots(&self, use_normals: bool) -> u32 {
        match self.mode {
            VolumeMode::Mip | VolumeMode::Drr(_) | VolumeMode::Mask(_) => 1,
            VolumeMode::Dvr(_) => 2 + u32::from(use_normals),
        }
    }

    fn program(&mut self, ctx: &mut FrameContext<'_>, use_normals: bool) -> Result<ResourceId> {
        let slot = usize::from(use_normals);
        if let Some(id) = self.programs[slot] {
            return Ok(id);
        }

        let mut defines = ShaderDefines::new().with("MODE", self.mode.name());
        if use_normals {
            defines.set("USE_NORMALS", "1");
        }
        if let VolumeMode::Mask(mask) = self.mode
            && !mask.filling
        {
            defines.set("MASK_OUTLINE", "1");
        }
        let id = ctx.shaders.acquire_program(
            &mut *ctx.device,
            &ProgramRequest {
                source_name: VOLUME_SHADER,
                defines: &defines,
                uniforms: &self.layout,
                texture_slots: self.texture_slots(use_normals),
            },
        )?;
        self.programs[slot] = Some(id);
        Ok(id)
    }
}

impl GeometryRenderer for VolumeRenderer {
    fn required_roles(&self) -> &[u32] {
        self.sampled_role()
    }

    fn optional_roles(&self) -> &[u32] {
        match self.mode {
            VolumeMode::Dvr(dvr) if dvr.lighting => &self.normals_role[..],
            _ => &[],
        }
    }

    fn begin(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.programs = [None; 2];

        if self.proxy_resource.is_none() {
            self.proxy_resource = Some(self.proxy.acquire_video_resource(&mut ctx.upload_context())?);
        }

        if matches!(self.mode, VolumeMode::Dvr(_)) {
            let resource = match self.color_map_resource.take() {
                Some(resource) => resource,
                None => self.color_map_feature.acquire_video_resource(&mut ctx.upload_context())?,
            };
            resource.sync(&mut ctx.upload_context())?;
            self.color_map_resource = Some(resource);
        } else {
            self.color_map_resource = None;
        }
        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>, item: &DrawItem<'_>) -> Result<usize> {
        let Some(sampled) = item.resource(self.sampled_role()[0]) else {
            return Ok(0);
        };
        let Some(mesh) = self.proxy_resource.as_ref().map(VideoResource::id) else {
            return Ok(0);
        };
        let normals = self.uses_normals(item);
        let program = self.program(ctx, normals.is_some())?;

        let mut textures: SmallVec<[ResourceId; 3]> = SmallVec::new();
        textures.push(sampled);
        if let Some(color_map) = &self.color_map_resource {
            textures.push(color_map.id());
        }
        textures.extend(normals);

        let model_view = item.renderable.model_view();
        let mut uniforms = UniformValues::default();
        uniforms.insert("model_view".into(), model_view.into());
        uniforms.insert("projection".into(), item.projection.into());
        uniforms.insert("model_view_projection".into(), (item.projection * model_view).into());
        uniforms.insert("model_view_inverse".into(), model_view.inverse().into());
        uniforms.insert("step_length".into(), (1.0 / self.sample_rate as f32).into());
        self.mode.insert_uniforms(&mut uniforms);

        ctx.device.draw(&DrawCall {
            program,
            mesh,
            state: self.mode.render_state(),
            textures: &textures,
            uniforms: &uniforms,
        })?;
        Ok(1)
    }

    fn release(&mut self) {
        self.proxy_resource = None;
        self.color_map_resource = None;
        self.programs = [None; 2];
    }
}

/// Stage ray marching volume segments.
pub type VolumeRenderingStage = GeometryStage<VolumeRenderer>;

impl GeometryStage<VolumeRenderer> {
    /// Volume stage for geometries of `geometry_type`, named after the mode.
    pub fn with_mode(geometry_type: u32, mode: VolumeMode) -> Result<Self> {
        Ok(Self::new(
            mode.name(),
            StageCategory::Volume,
            RenderQueue::new(geometry_type),
            RenderOrder::BackToFront,
            VolumeRenderer::new(mode)?,
        ))
    }

    /// Like [`Self::with_mode`], sampling at the rate configured in `settings`.
    pub fn with_settings(geometry_type: u32, mode: VolumeMode, settings: &RendererSettings) -> Result<Self> {
        let mut stage = Self::with_mode(geometry_type, mode)?;
        stage.renderer_mut().set_sample_rate(settings.sample_rate)?;
        Ok(stage)
    }

    pub fn mip(geometry_type: u32) -> Result<Self> {
        Self::with_mode(geometry_type, VolumeMode::Mip)
    }

    pub fn dvr(geometry_type: u32) -> Result<Self> {
        Self::with_mode(geometry_type, VolumeMode::Dvr(DvrSettings::default()))
    }

    pub fn drr(geometry_type: u32) -> Result<Self> {
        Self::with_mode(geometry_type, VolumeMode::Drr(DrrSettings::default()))
    }

    /// Filled masks read from [`VolumeRenderer::ROLE_MASK`].
    pub fn mask(geometry_type: u32) -> Result<Self> {
        Self::with_mode(geometry_type, VolumeMode::Mask(MaskSettings::default()))
    }
}
