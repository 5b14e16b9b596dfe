//! Mesh Rendering
//!
//! Draws geometries carrying a [`Mesh`](crate::resources::Mesh) and a
//! [`Material`]. The same renderer backs the opaque stage (front to back,
//! for early depth rejection) and the transparent stage (back to front, for
//! correct blending).

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::DrawCall;
use crate::renderer::geometry_stage::{DrawItem, GeometryRenderer, GeometryStage};
use crate::renderer::queue::{RenderOrder, RenderQueue};
use crate::renderer::stage::{FrameContext, StageCategory};
use crate::resources::material::Material;

pub struct MeshRenderer {
    roles: [u32; 2],
}

impl MeshRenderer {
    pub const ROLE_DEFAULT_MESH: u32 = 0;
    pub const ROLE_DEFAULT_MATERIAL: u32 = 1;

    #[must_use]
    pub fn new(mesh_role: u32, material_role: u32) -> Self {
        Self {
            roles: [mesh_role, material_role],
        }
    }

    #[must_use]
    pub fn mesh_role(&self) -> u32 {
        self.roles[0]
    }

    #[must_use]
    pub fn material_role(&self) -> u32 {
        self.roles[1]
    }
}

impl Default for MeshRenderer {
    fn default() -> Self {
        Self::new(Self::ROLE_DEFAULT_MESH, Self::ROLE_DEFAULT_MATERIAL)
    }
}

impl GeometryRenderer for MeshRenderer {
    fn required_roles(&self) -> &[u32] {
        &self.roles
    }

    fn draw(&mut self, ctx: &mut FrameContext<'_>, item: &DrawItem<'_>) -> Result<usize> {
        let (Some(mesh), Some(program)) = (
            item.resource(self.mesh_role()),
            item.resource(self.material_role()),
        ) else {
            return Ok(0);
        };
        let feature = item.renderable.feature(self.material_role());
        let Some(material) = feature.and_then(|f| f.downcast_ref::<Material>()) else {
            return Err(VolumetraError::ResourceAcquisition {
                label: feature.map_or_else(String::new, |f| f.label().to_owned()),
                reason: format!("role {} does not hold a material", self.material_role()),
            });
        };

        let uniforms = material.draw_uniforms(item.renderable.model_view(), item.projection);
        ctx.device.draw(&DrawCall {
            program,
            mesh,
            state: material.render_state(),
            textures: &[],
            uniforms: &uniforms,
        })?;
        Ok(1)
    }
}

/// Stage drawing meshes with their materials.
pub type MeshRenderingStage = GeometryStage<MeshRenderer>;

impl GeometryStage<MeshRenderer> {
    /// Opaque meshes of `geometry_type`, drawn front to back.
    #[must_use]
    pub fn opaque(geometry_type: u32) -> Self {
        Self::new(
            "Opaque",
            StageCategory::Opaque,
            RenderQueue::new(geometry_type),
            RenderOrder::FrontToBack,
            MeshRenderer::default(),
        )
    }

    /// Blended meshes of `geometry_type`, drawn back to front.
    #[must_use]
    pub fn transparent(geometry_type: u32) -> Self {
        Self::new(
            "Transparent",
            StageCategory::Transparent,
            RenderQueue::new(geometry_type),
            RenderOrder::BackToFront,
            MeshRenderer::default(),
        )
    }
}
