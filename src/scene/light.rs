//! Light sources
//!
//! Tagged variant over the supported light kinds. Point and directional
//! lights are sampled analytically by the integrator; mesh-emissive lights
//! reference the emitting scene object and are sampled by area over its
//! triangles.

use cgmath::Vector3;

/// Per-kind light parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum LightParams {
    /// Omnidirectional emitter at the owning object's position with
    /// inverse-square falloff.
    Point,
    /// Parallel light travelling along `direction` (world space).
    Directional { direction: Vector3<f32> },
    /// The owning object's mesh emits; sampled by surface area.
    MeshEmissive,
}

/// A light component: color, intensity and kind parameters.
#[derive(Debug, Clone)]
pub struct Light {
    pub color: Vector3<f32>,
    pub intensity: f32,
    params: LightParams,
}

impl Light {
    pub fn point(color: Vector3<f32>, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            params: LightParams::Point,
        }
    }

    pub fn directional(color: Vector3<f32>, intensity: f32, direction: Vector3<f32>) -> Self {
        Self {
            color,
            intensity,
            params: LightParams::Directional { direction },
        }
    }

    pub fn mesh_emissive(color: Vector3<f32>, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            params: LightParams::MeshEmissive,
        }
    }

    pub fn params(&self) -> &LightParams {
        &self.params
    }

    /// Radiant color scaled by intensity.
    pub fn radiance(&self) -> Vector3<f32> {
        self.color * self.intensity
    }
}
