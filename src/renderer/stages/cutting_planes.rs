//! Cutting Planes
//!
//! Draws the intersections of planes with a Hounsfield volume as windowed
//! gray values. The stage queue holds the volume segments; the planes are
//! geometries of a second type, collected in a queue of their own. Each
//! segment is drawn once per plane with a square large enough to cover the
//! segment at any orientation; fragments outside the segment are discarded.
//!
//! A plane geometry's local Z axis is the plane normal. Its position only
//! matters along that normal: the square is centered on the point of the
//! plane closest to each segment's center.

use glam::{Mat4, Vec3, Vec4};

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{DrawCall, ResourceId};
use crate::renderer::geometry_stage::{DrawItem, GeometryRenderer, GeometryStage};
use crate::renderer::queue::{RenderOrder, RenderQueue};
use crate::renderer::shader_manager::ProgramRequest;
use crate::renderer::stage::{FrameContext, StageCategory};
use crate::resources::feature::{GeometryFeature, VideoResource};
use crate::resources::mesh::MeshFactory;
use crate::resources::render_state::RenderState;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::{UniformLayout, UniformType, UniformValues};
use crate::scene::{NodeHandle, Scene};
use crate::volume::voxel::Hounsfield;

/// Name of the built-in cutting plane source.
pub const CUTTING_PLANE_SHADER: &str = "cutting_plane";

/// Draw logic of a [`CuttingPlanesStage`].
pub struct CuttingPlanesRenderer {
    intensities_role: [u32; 1],
    planes: RenderQueue,
    windowing_level: i16,
    windowing_width: u16,
    inverse: bool,

    layout: UniformLayout,
    square: GeometryFeature,
    square_resource: Option<VideoResource>,
    program: Option<ResourceId>,
}

impl CuttingPlanesRenderer {
    pub const ROLE_INTENSITIES: u32 = 0;
    pub const DEFAULT_WINDOWING_WIDTH: u16 = 4096;
    pub const DEFAULT_WINDOWING_LEVEL: i16 = 1024;

    pub fn new(plane_geometry_type: u32) -> Result<Self> {
        // Half-diagonal of the unit cube, so the square always covers a segment.
        let square = MeshFactory::create_square(3.0_f32.sqrt())?;
        Ok(Self {
            intensities_role: [Self::ROLE_INTENSITIES],
            planes: RenderQueue::new(plane_geometry_type),
            windowing_level: Self::DEFAULT_WINDOWING_LEVEL,
            windowing_width: Self::DEFAULT_WINDOWING_WIDTH,
            inverse: false,
            layout: UniformLayout::new([
                ("model_view_projection", UniformType::Mat4),
                ("plane_tangent_model", UniformType::Mat4),
                ("min_intensity", UniformType::Float),
                ("max_intensity", UniformType::Float),
                ("invert", UniformType::Bool),
            ]),
            square: GeometryFeature::new(square),
            square_resource: None,
            program: None,
        })
    }

    #[must_use]
    pub fn intensities_role(&self) -> u32 {
        self.intensities_role[0]
    }

    pub fn set_intensities_role(&mut self, role: u32) {
        self.intensities_role = [role];
    }

    #[must_use]
    pub fn plane_geometry_type(&self) -> u32 {
        self.planes.geometry_type()
    }

    /// Planes collected for the current frame.
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.entries().len()
    }

    /// Center of the gray-value window, in Hounsfield units.
    #[must_use]
    pub fn windowing_level(&self) -> i16 {
        self.windowing_level
    }

    pub fn set_windowing_level(&mut self, level: i16) {
        self.windowing_level = level;
    }

    /// Width of the gray-value window, in Hounsfield units.
    #[must_use]
    pub fn windowing_width(&self) -> u16 {
        self.windowing_width
    }

    pub fn set_windowing_width(&mut self, width: u16) -> Result<()> {
        if width == 0 {
            return Err(VolumetraError::Configuration("windowing width must be positive".into()));
        }
        self.windowing_width = width;
        Ok(())
    }

    /// Lowest Hounsfield value of the window; drawn black.
    #[must_use]
    pub fn minimum_hounsfield(&self) -> f32 {
        f32::from(self.windowing_level) - f32::from(self.windowing_width) / 2.0
    }

    /// Highest Hounsfield value of the window; drawn white.
    #[must_use]
    pub fn maximum_hounsfield(&self) -> f32 {
        f32::from(self.windowing_level) + f32::from(self.windowing_width) / 2.0
    }

    #[must_use]
    pub fn is_rendering_inverse(&self) -> bool {
        self.inverse
    }

    /// Draws dense tissue dark and air bright.
    pub fn set_rendering_inverse(&mut self, inverse: bool) {
        self.inverse = inverse;
    }

    fn program(&mut self, ctx: &mut FrameContext<'_>) -> Result<ResourceId> {
        if let Some(id) = self.program {
            return Ok(id);
        }
        let id = ctx.shaders.acquire_program(
            &mut *ctx.device,
            &ProgramRequest {
                source_name: CUTTING_PLANE_SHADER,
                defines: &ShaderDefines::new(),
                uniforms: &self.layout,
                texture_slots: 1,
            },
        )?;
        self.program = Some(id);
        Ok(id)
    }
}

/// Maps hounsfield units to the intensities stored in volume textures,
/// without clamping to the representable range.
fn hounsfield_to_intensity(hu: f32) -> f32 {
    let min = f32::from(Hounsfield::MIN);
    (hu - min) / (f32::from(Hounsfield::MAX) - min)
}

/// Transform from the tangent space of `plane_world` into the model space of
/// the segment placed by `volume_world`.
///
/// The tangent origin is the point of the plane closest to the segment's
/// center; tangent units are scaled by the segment's largest world extent.
#[must_use]
pub fn plane_tangent_model(volume_world: Mat4, plane_world: Mat4) -> Mat4 {
    let world_to_model = volume_world.inverse();

    let normal = plane_world.z_axis.truncate().normalize_or_zero();
    let center = volume_world.w_axis.truncate();
    let distance = plane_world.w_axis.truncate().dot(normal) - center.dot(normal);
    let location = center + normal * distance;

    let scale = volume_world
        .x_axis
        .truncate()
        .length()
        .max(volume_world.y_axis.truncate().length())
        .max(volume_world.z_axis.truncate().length());
    let mut scaled = world_to_model * Mat4::from_scale(Vec3::splat(scale));
    scaled.w_axis = Vec4::W;
    let mut rotation = plane_world;
    rotation.w_axis = Vec4::W;

    let mut tangent = scaled * rotation;
    tangent.w_axis = world_to_model * location.extend(1.0);
    tangent
}

impl GeometryRenderer for CuttingPlanesRenderer {
    fn required_roles(&self) -> &[u32] {
        &self.intensities_role
    }

    fn update_queues(&mut self, scene: &Scene, root: NodeHandle, view: Mat4) {
        self.planes.build(scene, root, view);
    }

    fn begin(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.program = None;
        if self.square_resource.is_none() {
            self.square_resource = Some(self.square.acquire_video_resource(&mut ctx.upload_context())?);
        }
        Ok(())
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>, item: &DrawItem<'_>) -> Result<usize> {
        let Some(intensities) = item.resource(self.intensities_role()) else {
            return Ok(0);
        };
        let Some(mesh) = self.square_resource.as_ref().map(VideoResource::id) else {
            return Ok(0);
        };
        if self.planes.entries().is_empty() {
            return Ok(0);
        }
        let program = self.program(ctx)?;

        let volume_world = item.renderable.world();
        let mut uniforms = UniformValues::default();
        uniforms.insert(
            "model_view_projection".into(),
            (item.projection * item.renderable.model_view()).into(),
        );
        uniforms.insert(
            "min_intensity".into(),
            hounsfield_to_intensity(self.minimum_hounsfield()).into(),
        );
        uniforms.insert(
            "max_intensity".into(),
            hounsfield_to_intensity(self.maximum_hounsfield()).into(),
        );
        uniforms.insert("invert".into(), self.inverse.into());

        let mut draw_calls = 0;
        for plane in self.planes.entries() {
            uniforms.insert(
                "plane_tangent_model".into(),
                plane_tangent_model(volume_world, plane.world()).into(),
            );
            ctx.device.draw(&DrawCall {
                program,
                mesh,
                state: RenderState::DEPTH_TEST | RenderState::DEPTH_WRITE,
                textures: &[intensities],
                uniforms: &uniforms,
            })?;
            draw_calls += 1;
        }
        Ok(draw_calls)
    }

    fn release(&mut self) {
        self.square_resource = None;
        self.program = None;
    }
}

/// Stage drawing planar cuts through volumes.
pub type CuttingPlanesStage = GeometryStage<CuttingPlanesRenderer>;

impl GeometryStage<CuttingPlanesRenderer> {
    /// Cuts geometries of `volume_geometry_type` with every geometry of
    /// `plane_geometry_type`.
    pub fn cutting_planes(volume_geometry_type: u32, plane_geometry_type: u32) -> Result<Self> {
        Ok(Self::new(
            "Cutting Planes",
            StageCategory::Opaque,
            RenderQueue::new(volume_geometry_type),
            RenderOrder::Insertion,
            CuttingPlanesRenderer::new(plane_geometry_type)?,
        ))
    }
}
