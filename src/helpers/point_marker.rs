//! Point Marker Helper
//!
//! Creates geometries that mark single points, for example landmarks placed
//! inside a volume. All markers of a helper share one point mesh. Markers
//! without an explicit color cycle through [`MARKER_PALETTE`],
//! sharing one material per palette entry.
//!
//! The material declares a `point_size` uniform, read by the picking stage.

use glam::Vec4;

use crate::errors::Result;
use crate::renderer::stages::MeshRenderer;
use crate::resources::feature::GeometryFeature;
use crate::resources::material::{Material, SOLID_SHADER};
use crate::resources::mesh::MeshFactory;
use crate::scene::{NodeHandle, Scene};

/// Colors assigned to markers in turn.
pub const MARKER_PALETTE: [Vec4; 6] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 1.0),
    Vec4::new(1.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 1.0, 1.0),
    Vec4::new(1.0, 0.0, 1.0, 1.0),
];

pub struct PointMarkerHelper {
    geometry_type: u32,
    mesh_role: u32,
    material_role: u32,
    point_size: f32,

    mesh: Option<GeometryFeature>,
    materials: [Option<GeometryFeature>; MARKER_PALETTE.len()],
    next_color: usize,
}

impl PointMarkerHelper {
    /// Markers of `geometry_type` with the default mesh and material roles.
    #[must_use]
    pub fn new(geometry_type: u32, point_size: f32) -> Self {
        Self::with_roles(
            geometry_type,
            MeshRenderer::ROLE_DEFAULT_MESH,
            MeshRenderer::ROLE_DEFAULT_MATERIAL,
            point_size,
        )
    }

    #[must_use]
    pub fn with_roles(geometry_type: u32, mesh_role: u32, material_role: u32, point_size: f32) -> Self {
        Self {
            geometry_type,
            mesh_role,
            material_role,
            point_size,
            mesh: None,
            materials: Default::default(),
            next_color: 0,
        }
    }

    #[must_use]
    pub fn geometry_type(&self) -> u32 {
        self.geometry_type
    }

    #[must_use]
    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    /// Restarts the palette at its first color.
    pub fn reset_colors(&mut self) {
        self.next_color = 0;
    }

    fn material(&self, color: Vec4) -> Material {
        Material::builder("point marker", SOLID_SHADER)
            .with_define("UNLIT", "1")
            .with_uniform("color", color)
            .with_uniform("point_size", self.point_size)
            .build()
    }

    fn mesh(&mut self) -> Result<GeometryFeature> {
        if let Some(mesh) = &self.mesh {
            return Ok(mesh.clone());
        }
        let mesh = GeometryFeature::new(MeshFactory::create_point()?);
        self.mesh = Some(mesh.clone());
        Ok(mesh)
    }

    fn add_marker(&mut self, scene: &mut Scene, parent: NodeHandle, material: GeometryFeature) -> Result<NodeHandle> {
        let mesh = self.mesh()?;
        scene
            .build_geometry(self.geometry_type)
            .with_tag("point marker")
            .with_parent(parent)
            .with_feature(self.mesh_role, mesh)
            .with_feature(self.material_role, material)
            .build()
    }

    /// Creates a marker under `parent` in the next palette color.
    pub fn create_point_marker(&mut self, scene: &mut Scene, parent: NodeHandle) -> Result<NodeHandle> {
        let index = self.next_color;
        self.next_color = (index + 1) % MARKER_PALETTE.len();
        let material = match &self.materials[index] {
            Some(material) => material.clone(),
            None => {
                let material = GeometryFeature::new(self.material(MARKER_PALETTE[index]));
                self.materials[index] = Some(material.clone());
                material
            }
        };
        self.add_marker(scene, parent, material)
    }

    /// Creates a marker under `parent` with a material of its own.
    pub fn create_point_marker_with_color(
        &mut self,
        scene: &mut Scene,
        parent: NodeHandle,
        color: Vec4,
    ) -> Result<NodeHandle> {
        let material = GeometryFeature::new(self.material(color));
        self.add_marker(scene, parent, material)
    }

    /// Ends the helper's ownership of the shared mesh and materials. Markers
    /// created later get fresh ones.
    pub fn release_geometry_features(&mut self) {
        self.mesh = None;
        self.materials = Default::default();
    }
}
