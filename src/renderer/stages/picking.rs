//! Mesh Picking
//!
//! Maps frame coordinates to the geometry drawn there. Each pass records the
//! meshes of the activated geometry types with their model-view-projection
//! transforms; [`MeshPickingRenderer::pick`] then intersects the pick
//! location with their projected primitives on the CPU and returns the
//! nearest hit. Nothing is uploaded, so the stage can sit anywhere in the
//! sequence.
//!
//! Frame coordinates have their origin at the top-left pixel of the
//! framebuffer. Point primitives are hit within half the `point_size`
//! uniform of their material, if materials were enabled for the type, but no
//! less than one pixel. Lines are hit within one pixel.

use glam::{Mat4, Vec2, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::renderer::geometry_stage::{DrawItem, GeometryRenderer, GeometryStage};
use crate::renderer::queue::{RenderOrder, RenderQueue};
use crate::renderer::stage::{FrameContext, StageCategory};
use crate::renderer::viewport::Viewport;
use crate::resources::feature::GeometryFeature;
use crate::resources::material::Material;
use crate::resources::mesh::{Mesh, PrimitiveType};
use crate::resources::uniforms::UniformValue;
use crate::scene::NodeHandle;

/// Roles read from geometries of one activated type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PickRoles {
    mesh: u32,
    material: Option<u32>,
}

/// A mesh recorded during the last pass.
struct PickTarget {
    geometry: NodeHandle,
    mesh: GeometryFeature,
    model_view_projection: Mat4,
    point_size: f32,
}

/// A vertex in frame coordinates with its normalized depth.
#[derive(Debug, Clone, Copy)]
struct FramePoint {
    position: Vec2,
    depth: f32,
}

#[derive(Default)]
pub struct MeshPickingRenderer {
    roles: FxHashMap<u32, PickRoles>,
    targets: Vec<PickTarget>,
    viewport: Option<Viewport>,
}

impl MeshPickingRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records meshes of `mesh_role` on geometries of `geometry_type`.
    /// Replaces the role of a type activated before.
    pub fn put_geometry_type(&mut self, geometry_type: u32, mesh_role: u32) {
        self.roles
            .entry(geometry_type)
            .and_modify(|roles| roles.mesh = mesh_role)
            .or_insert(PickRoles {
                mesh: mesh_role,
                material: None,
            });
    }

    /// Reads point sizes from the materials of `material_role`. No-op unless
    /// `geometry_type` is activated.
    pub fn enable_materials(&mut self, geometry_type: u32, material_role: u32) {
        if let Some(roles) = self.roles.get_mut(&geometry_type) {
            roles.material = Some(material_role);
        }
    }

    /// Deactivates `geometry_type` and its materials.
    pub fn remove_geometry_type(&mut self, geometry_type: u32) {
        self.roles.remove(&geometry_type);
    }

    pub fn clear_geometry_types(&mut self) {
        self.roles.clear();
    }

    #[must_use]
    pub fn has_geometry_type(&self, geometry_type: u32) -> bool {
        self.roles.contains_key(&geometry_type)
    }

    /// Geometry drawn at frame coordinates `(x, y)` in the last pass, if any.
    #[must_use]
    pub fn pick(&self, x: u32, y: u32) -> Option<NodeHandle> {
        let viewport = self.viewport?;
        if x < viewport.x || y < viewport.y || x - viewport.x >= viewport.width || y - viewport.y >= viewport.height
        {
            return None;
        }
        let location = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);

        let mut nearest: Option<(f32, NodeHandle)> = None;
        for target in &self.targets {
            let Some(mesh) = target.mesh.downcast_ref::<Mesh>() else {
                continue;
            };
            if let Some(depth) = hit_depth(mesh, target, &viewport, location)
                && nearest.is_none_or(|(best, _)| depth < best)
            {
                nearest = Some((depth, target.geometry));
            }
        }
        nearest.map(|(_, geometry)| geometry)
    }
}

/// Projects `position` into frame coordinates; `None` behind the eye.
fn to_frame(model_view_projection: Mat4, viewport: &Viewport, position: [f32; 3]) -> Option<FramePoint> {
    let clip = model_view_projection * Vec3::from_array(position).extend(1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(FramePoint {
        position: Vec2::new(
            viewport.x as f32 + (ndc.x * 0.5 + 0.5) * viewport.width as f32,
            viewport.y as f32 + (0.5 - ndc.y * 0.5) * viewport.height as f32,
        ),
        depth: ndc.z,
    })
}

/// Depth of the nearest primitive of `mesh` covering `location`.
fn hit_depth(mesh: &Mesh, target: &PickTarget, viewport: &Viewport, location: Vec2) -> Option<f32> {
    let vertices = mesh.vertices();
    let project = |index: u32| {
        vertices
            .get(index as usize)
            .and_then(|vertex| to_frame(target.model_view_projection, viewport, vertex.position))
    };

    let mut nearest: Option<f32> = None;
    for primitive in mesh.indices().chunks_exact(mesh.primitive().arity()) {
        let Some(points) = primitive.iter().map(|&index| project(index)).collect::<Option<Vec<_>>>() else {
            continue;
        };
        let depth = match (mesh.primitive(), points.as_slice()) {
            (PrimitiveType::Triangles, [a, b, c]) => triangle_depth(*a, *b, *c, location),
            (PrimitiveType::Lines, [a, b]) => segment_depth(*a, *b, location, 1.0),
            (PrimitiveType::Points, [a]) => {
                (a.position.distance(location) <= (target.point_size / 2.0).max(1.0)).then_some(a.depth)
            }
            _ => None,
        };
        if let Some(depth) = depth
            && (-1.0..=1.0).contains(&depth)
            && nearest.is_none_or(|best| depth < best)
        {
            nearest = Some(depth);
        }
    }
    nearest
}

fn triangle_depth(a: FramePoint, b: FramePoint, c: FramePoint, p: Vec2) -> Option<f32> {
    let area = (b.position - a.position).perp_dot(c.position - a.position);
    if area.abs() <= f32::EPSILON {
        return None;
    }
    let wa = (b.position - p).perp_dot(c.position - p) / area;
    let wb = (c.position - p).perp_dot(a.position - p) / area;
    let wc = 1.0 - wa - wb;
    (wa >= 0.0 && wb >= 0.0 && wc >= 0.0).then(|| wa * a.depth + wb * b.depth + wc * c.depth)
}

fn segment_depth(a: FramePoint, b: FramePoint, p: Vec2, tolerance: f32) -> Option<f32> {
    let ab = b.position - a.position;
    let t = if ab.length_squared() > 0.0 {
        ((p - a.position).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = a.position + ab * t;
    (closest.distance(p) <= tolerance).then(|| a.depth + (b.depth - a.depth) * t)
}

impl GeometryRenderer for MeshPickingRenderer {
    fn required_roles(&self) -> &[u32] {
        &[]
    }

    fn begin(&mut self, ctx: &mut FrameContext<'_>) -> Result<()> {
        self.targets.clear();
        self.viewport = Some(ctx.viewport);
        Ok(())
    }

    fn draw(&mut self, _ctx: &mut FrameContext<'_>, item: &DrawItem<'_>) -> Result<usize> {
        let renderable = item.renderable;
        let Some(roles) = self.roles.get(&renderable.geometry_type()) else {
            return Ok(0);
        };
        let Some(mesh) = renderable.feature(roles.mesh) else {
            return Ok(0);
        };
        let point_size = roles
            .material
            .and_then(|role| renderable.feature(role))
            .and_then(|feature| feature.downcast_ref::<Material>())
            .and_then(|material| match material.uniform("point_size") {
                Some(UniformValue::Float(size)) => Some(size),
                _ => None,
            })
            .unwrap_or(1.0);

        self.targets.push(PickTarget {
            geometry: renderable.geometry(),
            mesh: mesh.clone(),
            model_view_projection: item.projection * renderable.model_view(),
            point_size,
        });
        Ok(0)
    }

    fn release(&mut self) {
        self.targets.clear();
        self.viewport = None;
    }
}

/// Stage mapping frame coordinates to geometries.
pub type MeshPickingStage = GeometryStage<MeshPickingRenderer>;

impl GeometryStage<MeshPickingRenderer> {
    /// Picking stage with no geometry type activated yet.
    #[must_use]
    pub fn picking() -> Self {
        Self::new(
            "Picking",
            StageCategory::PreProcess,
            RenderQueue::with_mask(0, 0),
            RenderOrder::Insertion,
            MeshPickingRenderer::new(),
        )
    }

    /// See [`MeshPickingRenderer::pick`].
    #[must_use]
    pub fn pick(&self, x: u32, y: u32) -> Option<NodeHandle> {
        self.renderer().pick(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32, depth: f32) -> FramePoint {
        FramePoint {
            position: Vec2::new(x, y),
            depth,
        }
    }

    #[test]
    fn triangle_hits_interpolate_depth() {
        let (a, b, c) = (point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.5), point(0.0, 10.0, 0.5));
        assert_eq!(triangle_depth(a, b, c, Vec2::ZERO), Some(0.0));
        let depth = triangle_depth(a, b, c, Vec2::new(2.5, 2.5)).unwrap();
        assert!((depth - 0.25).abs() < 1e-6);
        assert_eq!(triangle_depth(a, b, c, Vec2::new(8.0, 8.0)), None);
        // Winding does not matter.
        assert!(triangle_depth(a, c, b, Vec2::new(2.5, 2.5)).is_some());
    }

    #[test]
    fn segments_are_hit_within_tolerance() {
        let (a, b) = (point(0.0, 0.0, 0.0), point(10.0, 0.0, 1.0));
        assert_eq!(segment_depth(a, b, Vec2::new(5.0, 0.5), 1.0), Some(0.5));
        assert_eq!(segment_depth(a, b, Vec2::new(5.0, 2.0), 1.0), None);
    }

    #[test]
    fn materials_need_an_activated_type() {
        let mut renderer = MeshPickingRenderer::new();
        renderer.enable_materials(1, 4);
        assert!(!renderer.has_geometry_type(1));

        renderer.put_geometry_type(1, 0);
        renderer.enable_materials(1, 4);
        renderer.put_geometry_type(1, 3);
        assert_eq!(
            renderer.roles.get(&1),
            Some(&PickRoles {
                mesh: 3,
                material: Some(4)
            })
        );

        renderer.remove_geometry_type(1);
        assert!(!renderer.has_geometry_type(1));
    }

    #[test]
    fn nothing_is_picked_before_a_pass() {
        assert_eq!(MeshPickingRenderer::new().pick(0, 0), None);
    }
}
