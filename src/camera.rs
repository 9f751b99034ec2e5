//! Pinhole camera: ray generation from pixel-space coordinates.

use crate::math::{Point3, Ray, Vec3};

/// A pinhole camera. Basis vectors and tangent half-angles are precomputed
/// once at construction since the camera is immutable during rendering.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    eye: Point3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    tan_fov_x_half: f32,
    tan_fov_y_half: f32,
    width: f32,
    height: f32,
}

impl Camera {
    pub fn new(eye: Point3, look_at: Point3, up: Vec3, fov_y_degrees: f32, width: u32, height: u32) -> Self {
        let w = (eye - look_at).normalized();
        let u = up.cross(w).normalized();
        let v = w.cross(u);

        let tan_fov_y_half = (fov_y_degrees.to_radians() / 2.0).tan();
        let tan_fov_x_half = tan_fov_y_half * width as f32 / height as f32;

        Self {
            eye,
            u,
            v,
            w,
            tan_fov_x_half,
            tan_fov_y_half,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Casts a ray through continuous pixel coordinates `(x, y)`, `y`
    /// increasing downward per the image convention.
    pub fn cast_ray(&self, x: f32, y: f32) -> Ray {
        let alpha = self.tan_fov_x_half * (x - self.width / 2.0) / (self.width / 2.0);
        let beta = self.tan_fov_y_half * (self.height / 2.0 - y) / (self.height / 2.0);
        let direction = (self.u * alpha + self.v * beta - self.w).normalized();
        Ray::new(self.eye, direction)
    }
}
