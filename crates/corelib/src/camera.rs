use crate::{Bounds3, Mat4, Vec3};

/// Perspective camera on +Z looking at a target (right-handed, depth in `[0, 1]`).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    /// Far enough back that the bounding sphere of `bounds` fits the
    /// vertical field of view, with near/far planes hugging the sphere.
    pub fn framing(bounds: &Bounds3, fov_y_rad: f32, aspect: f32) -> Self {
        let radius = bounds.radius().max(1e-3);
        let distance = radius / (fov_y_rad * 0.5).sin() * 1.1;
        let target = bounds.center();
        Self {
            eye: target + Vec3::Z * distance,
            target,
            fov_y_rad,
            z_near: (distance - radius).max(distance * 1e-3),
            z_far: distance + radius * 2.0,
            aspect,
        }
    }

    #[inline]
    pub fn distance(&self) -> f32 {
        (self.eye - self.target).length()
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }
}
