//! Environment lighting
//!
//! Radiance that rays pick up when they leave the scene. Either a constant
//! color (the furnace-test configuration) or an equirectangular radiance
//! image imported from an HDR/EXR panorama.

use cgmath::{InnerSpace, Vector3};

#[derive(Debug)]
pub enum Environment {
    /// Uniform radiance in every direction.
    Constant(Vector3<f32>),
    /// Equirectangular panorama, longitude along x, latitude along y.
    Equirect {
        width: u32,
        height: u32,
        pixels: Vec<Vector3<f32>>,
    },
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Constant(Vector3::new(0.0, 0.0, 0.0))
    }
}

impl Environment {
    pub fn constant(radiance: Vector3<f32>) -> Self {
        Environment::Constant(radiance)
    }

    /// Radiance arriving from world direction `dir` (unit length).
    pub fn radiance(&self, dir: Vector3<f32>) -> Vector3<f32> {
        match self {
            Environment::Constant(radiance) => *radiance,
            Environment::Equirect {
                width,
                height,
                pixels,
            } => {
                let dir = dir.normalize();
                let u = 0.5 + dir.z.atan2(dir.x) / std::f32::consts::TAU;
                let v = dir.y.clamp(-1.0, 1.0).acos() / std::f32::consts::PI;
                let x = ((u * *width as f32) as u32).min(width - 1);
                let y = ((v * *height as f32) as u32).min(height - 1);
                pixels[(y * width + x) as usize]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_environment_is_direction_independent() {
        let env = Environment::constant(Vector3::new(1.0, 0.5, 0.25));
        let a = env.radiance(Vector3::new(0.0, 1.0, 0.0));
        let b = env.radiance(Vector3::new(0.3, -0.9, 0.1).normalize());
        assert_eq!(a, b);
    }

    #[test]
    fn equirect_lookup_lands_in_the_right_hemisphere() {
        // 2x1 map: left half red, right half green
        let env = Environment::Equirect {
            width: 2,
            height: 1,
            pixels: vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)],
        };
        // atan2 puts -z at u = 0.25 and +x at u = 0.5
        let minus_z = env.radiance(Vector3::new(0.0, 0.0, -1.0));
        let plus_x = env.radiance(Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(minus_z, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(plus_x, Vector3::new(0.0, 1.0, 0.0));
    }
}
