//! Perspective camera
//!
//! Generates primary rays for the path tracer. Orientation is stored as a
//! position/target/up triple so front-ends can drive it however they like;
//! the basis used for ray generation is rebuilt on demand.

use cgmath::{InnerSpace, Rad, Vector3};

use crate::accel::Ray;

pub struct Camera {
    pub position: Vector3<f32>,
    pub target: Vector3<f32>,
    pub up: Vector3<f32>,
    pub fov_y: Rad<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 1.0, 5.0),
            target: Vector3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fov_y: Rad(std::f32::consts::FRAC_PI_4),
        }
    }
}

impl Camera {
    pub fn look_at(position: Vector3<f32>, target: Vector3<f32>) -> Self {
        Self {
            position,
            target,
            ..Self::default()
        }
    }

    /// Primary ray through the film point `(s, t)` where both run 0..1
    /// across the image, `t` downward from the top row.
    pub fn primary_ray(&self, s: f32, t: f32, aspect: f32) -> Ray {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);

        let half_height = (self.fov_y.0 * 0.5).tan();
        let half_width = half_height * aspect;

        let x = (2.0 * s - 1.0) * half_width;
        let y = (1.0 - 2.0 * t) * half_height;

        let direction = (forward + right * x + up * y).normalize();
        Ray::new(self.position, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_ray_points_at_target() {
        let camera = Camera::look_at(Vector3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 0.0));
        let ray = camera.primary_ray(0.5, 0.5, 1.0);
        assert!((ray.direction.z - -1.0).abs() < 1e-5);
        assert!(ray.direction.x.abs() < 1e-5);
        assert!(ray.direction.y.abs() < 1e-5);
    }
}
