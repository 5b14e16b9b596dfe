use glam::{Affine3A, Mat4, Quat, Vec3};

/// Position, rotation and scale a local matrix was last built from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Trs {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
}

/// Placement of a spatial relative to its parent.
///
/// The public TRS fields are the source of truth. The local matrix is a cache
/// rebuilt by [`Transform::update_local_matrix`] whenever the fields differ
/// from the snapshot it was built from; the world matrix is written by the
/// scene's transform pass.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    /// `None` until the first build, and after [`Transform::mark_dirty`].
    built_from: Option<Trs>,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,
            built_from: None,
        }
    }

    fn trs(&self) -> Trs {
        Trs {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Rebuilds the local matrix if the TRS fields changed since the last
    /// build. Returns whether it was rebuilt.
    pub fn update_local_matrix(&mut self) -> bool {
        let current = self.trs();
        if self.built_from == Some(current) {
            return false;
        }
        self.local_matrix = Affine3A::from_scale_rotation_translation(current.scale, current.rotation, current.position);
        self.built_from = Some(current);
        true
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    /// World matrix as of the last [`Scene::update_world_transforms`](super::Scene::update_world_transforms).
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    pub(crate) fn set_world_matrix(&mut self, mat: Affine3A) {
        self.world_matrix = mat;
    }

    /// Replaces the placement by `mat`, decomposed into TRS. Shear is lost.
    ///
    /// The world matrix follows on the next transform pass.
    pub fn apply_local_matrix(&mut self, mat: Affine3A) {
        let (scale, rotation, position) = mat.to_scale_rotation_translation();
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
        self.mark_dirty();
    }

    pub fn apply_local_matrix_from_mat4(&mut self, mat: Mat4) {
        self.apply_local_matrix(Affine3A::from_mat4(mat));
    }

    /// Turns the spatial so that its -Z axis points at `target`, both given
    /// in the parent's frame. No-op if `up` is parallel to the direction.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let direction = target - self.position;
        if direction.cross(up).length_squared() < 1e-8 * direction.length_squared().max(1.0) {
            return;
        }
        let view = Mat4::look_at_rh(self.position, target, up);
        self.rotation = Quat::from_mat4(&view.inverse()).normalize();
    }

    /// Forces the next [`Transform::update_local_matrix`] to rebuild.
    pub fn mark_dirty(&mut self) {
        self.built_from = None;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
