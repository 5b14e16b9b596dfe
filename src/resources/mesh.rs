//! Meshes
//!
//! Indexed triangle (or line / point) meshes with per-vertex normals. A mesh
//! is attached to geometries as a [`GeometryFeature`](super::GeometryFeature)
//! and uploaded on first acquisition.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::errors::{Result, VolumetraError};
use crate::renderer::device::{MeshDesc, ResourceId};
use crate::resources::feature::{UploadContext, VideoResourceSource};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    #[default]
    Triangles,
    Lines,
    Points,
}

impl PrimitiveType {
    /// Indices consumed per primitive.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Triangles => 3,
            Self::Lines => 2,
            Self::Points => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    label: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    primitive: PrimitiveType,
}

impl Mesh {
    /// Validates that every index refers to a vertex and that the index count
    /// is a multiple of the primitive arity.
    pub fn new(
        label: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        primitive: PrimitiveType,
    ) -> Result<Self> {
        let label = label.into();
        if indices.len() % primitive.arity() != 0 {
            return Err(VolumetraError::Configuration(format!(
                "mesh '{label}': {} indices do not form whole {primitive:?}",
                indices.len()
            )));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(VolumetraError::Configuration(format!(
                "mesh '{label}': index {index} exceeds {} vertices",
                vertices.len()
            )));
        }
        Ok(Self {
            label,
            vertices,
            indices,
            primitive,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    /// Axis-aligned bounds `(min, max)` of the vertex positions.
    #[must_use]
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut positions = self.vertices.iter().map(|v| Vec3::from_array(v.position));
        let first = positions.next()?;
        Some(positions.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

impl VideoResourceSource for Mesh {
    fn label(&self) -> &str {
        &self.label
    }

    fn upload(&self, ctx: &mut UploadContext<'_>) -> Result<ResourceId> {
        ctx.device.create_mesh(&MeshDesc {
            label: &self.label,
            vertices: &self.vertices,
            indices: &self.indices,
            primitive: self.primitive,
        })
    }
}

/// Builders for common meshes.
pub struct MeshFactory;

impl MeshFactory {
    /// Axis-aligned box centered at the origin, 24 vertices with face normals.
    ///
    /// A box of [`Vec3::ONE`] is the proxy geometry of volume segments.
    pub fn create_box(size: Vec3) -> Result<Mesh> {
        let h = size / 2.0;
        // (normal, tangent u, tangent v) per face; u × v == normal keeps the winding counter-clockwise.
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (normal + u * su + v * sv) * h;
                vertices.push(Vertex::new(position, normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Mesh::new("box", vertices, indices, PrimitiveType::Triangles)
    }

    /// Square in the XY plane centered at the origin, facing +Z.
    pub fn create_square(side: f32) -> Result<Mesh> {
        let h = side / 2.0;
        let vertices = [(-h, -h), (h, -h), (h, h), (-h, h)]
            .map(|(x, y)| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z))
            .to_vec();
        Mesh::new("square", vertices, vec![0, 1, 2, 0, 2, 3], PrimitiveType::Triangles)
    }

    /// A single point at the origin.
    pub fn create_point() -> Result<Mesh> {
        Mesh::new("point", vec![Vertex::new(Vec3::ZERO, Vec3::Z)], vec![0], PrimitiveType::Points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_has_24_vertices_and_expected_bounds() {
        let mesh = MeshFactory::create_box(Vec3::new(2.0, 4.0, 6.0)).unwrap();
        assert_eq!(mesh.vertices().len(), 24);
        assert_eq!(mesh.indices().len(), 36);
        assert_eq!(mesh.bounds(), Some((Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0))));
    }

    #[test]
    fn box_faces_wind_counter_clockwise() {
        let mesh = MeshFactory::create_box(Vec3::ONE).unwrap();
        for triangle in mesh.indices().chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from_array(mesh.vertices()[triangle[i] as usize].position));
            let normal = Vec3::from_array(mesh.vertices()[triangle[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
    }

    #[test]
    fn square_lies_in_the_xy_plane() {
        let mesh = MeshFactory::create_square(2.0).unwrap();
        assert_eq!(mesh.indices().len(), 6);
        assert_eq!(mesh.bounds(), Some((Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0))));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let vertices = vec![Vertex::new(Vec3::ZERO, Vec3::Z); 2];
        assert!(Mesh::new("bad", vertices, vec![0, 1, 2], PrimitiveType::Triangles).is_err());
    }
}
