//! Object transform with derived orthonormal basis
//!
//! Position, rotation and scale plus the right/up/forward basis vectors
//! derived from the rotation. The basis is recomputed whenever the rotation
//! changes and the quaternion is renormalised after every composition, so
//! the basis stays unit-length and mutually orthogonal.

use cgmath::{InnerSpace, Matrix4, Quaternion, Rad, Rotation, Rotation3, Vector3};

/// Position, rotation (unit quaternion) and non-uniform scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    position: Vector3<f32>,
    rotation: Quaternion<f32>,
    scale: Vector3<f32>,
    right: Vector3<f32>,
    up: Vector3<f32>,
    forward: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Identity transform at the origin.
    pub fn identity() -> Self {
        let mut transform = Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
            right: Vector3::new(1.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            forward: Vector3::new(0.0, 0.0, -1.0),
        };
        transform.update_basis();
        transform
    }

    /// Transform at `position` with identity rotation and unit scale.
    pub fn at(position: Vector3<f32>) -> Self {
        let mut transform = Self::identity();
        transform.position = position;
        transform
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        self.rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    pub fn right(&self) -> Vector3<f32> {
        self.right
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.forward
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
    }

    /// Replaces the rotation. The quaternion is normalised before use.
    pub fn set_rotation(&mut self, rotation: Quaternion<f32>) {
        self.rotation = rotation.normalize();
        self.update_basis();
    }

    pub fn set_scale(&mut self, scale: Vector3<f32>) {
        self.scale = scale;
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.scale = Vector3::new(scale, scale, scale);
    }

    /// Composes an additional rotation on top of the current one.
    pub fn rotate(&mut self, rotation: Quaternion<f32>) {
        // Renormalise after composition so error cannot accumulate
        self.rotation = (rotation * self.rotation).normalize();
        self.update_basis();
    }

    /// Rotates around `axis` by `angle`.
    pub fn rotate_axis_angle(&mut self, axis: Vector3<f32>, angle: Rad<f32>) {
        self.rotate(Quaternion::from_axis_angle(axis.normalize(), angle));
    }

    pub fn translate(&mut self, delta: Vector3<f32>) {
        self.position += delta;
    }

    /// World matrix: translate * rotate * scale.
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    fn update_basis(&mut self) {
        self.right = self.rotation.rotate_vector(Vector3::new(1.0, 0.0, 0.0));
        self.up = self.rotation.rotate_vector(Vector3::new(0.0, 1.0, 0.0));
        self.forward = self.rotation.rotate_vector(Vector3::new(0.0, 0.0, -1.0));
    }
}
