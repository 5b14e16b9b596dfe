use glam::{Mat4, Vec3};

/// The host-supplied `(view, projection)` pair a frame is rendered with.
///
/// Projections follow the wgpu convention (right-handed, depth in `0..1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl Camera {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Perspective camera at the origin looking down -Z.
    ///
    /// `fov_y` is the vertical field of view in degrees.
    #[must_use]
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(
            Mat4::IDENTITY,
            Mat4::perspective_rh(fov_y.to_radians(), aspect, near, far),
        )
    }

    /// Orthographic camera showing `2 * half_height` units vertically.
    #[must_use]
    pub fn orthographic(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        let half_width = half_height * aspect;
        Self::new(
            Mat4::IDENTITY,
            Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far),
        )
    }

    /// Places the camera at `eye`, looking at `target`.
    #[must_use]
    pub fn look_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.view = Mat4::look_at_rh(eye, target, up);
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: Mat4) -> Self {
        self.view = view;
        self
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Eye position in world space.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_moves_eye() {
        let camera = Camera::perspective(45.0, 1.0, 0.1, 100.0).look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
        );
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
        let origin_in_view = camera.view.transform_point3(Vec3::ZERO);
        assert!((origin_in_view.z + 5.0).abs() < 1e-5);
    }
}
