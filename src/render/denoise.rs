//! Image-space denoising
//!
//! Post-accumulation filter applied before the final write. The built-in
//! denoiser is a joint bilateral filter on the radiance image: spatial
//! Gaussian weights damped by radiance similarity, so edges between
//! differently lit regions survive while flat-region noise averages out.

use cgmath::{InnerSpace, Vector3};
use rayon::prelude::*;

/// Filter applied to the accumulated image before export.
pub trait Denoiser: Send + Sync {
    fn denoise(&self, width: u32, height: u32, pixels: &[Vector3<f32>]) -> Vec<Vector3<f32>>;
}

/// Bilateral filter with a fixed spatial radius.
pub struct BilateralDenoiser {
    pub radius: i32,
    pub sigma_spatial: f32,
    pub sigma_color: f32,
}

impl Default for BilateralDenoiser {
    fn default() -> Self {
        Self {
            radius: 2,
            sigma_spatial: 1.5,
            sigma_color: 0.25,
        }
    }
}

impl Denoiser for BilateralDenoiser {
    fn denoise(&self, width: u32, height: u32, pixels: &[Vector3<f32>]) -> Vec<Vector3<f32>> {
        let w = width as i32;
        let h = height as i32;
        let inv_two_spatial = 1.0 / (2.0 * self.sigma_spatial * self.sigma_spatial);
        let inv_two_color = 1.0 / (2.0 * self.sigma_color * self.sigma_color);

        (0..pixels.len())
            .into_par_iter()
            .map(|index| {
                let x = (index as i32) % w;
                let y = (index as i32) / w;
                let center = pixels[index];
                let mut total = Vector3::new(0.0, 0.0, 0.0);
                let mut weight_sum = 0.0f32;
                for dy in -self.radius..=self.radius {
                    for dx in -self.radius..=self.radius {
                        let nx = x + dx;
                        let ny = y + dy;
                        if nx < 0 || nx >= w || ny < 0 || ny >= h {
                            continue;
                        }
                        let neighbor = pixels[(ny * w + nx) as usize];
                        let spatial = ((dx * dx + dy * dy) as f32) * inv_two_spatial;
                        let color = (neighbor - center).magnitude2() * inv_two_color;
                        let weight = (-spatial - color).exp();
                        total += neighbor * weight;
                        weight_sum += weight;
                    }
                }
                total / weight_sum.max(1e-8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_is_unchanged() {
        let pixels = vec![Vector3::new(0.5, 0.5, 0.5); 16];
        let out = BilateralDenoiser::default().denoise(4, 4, &pixels);
        for p in &out {
            assert!((p.x - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn moderate_speckle_is_pulled_toward_neighbors() {
        let mut pixels = vec![Vector3::new(0.1, 0.1, 0.1); 25];
        pixels[12] = Vector3::new(0.3, 0.3, 0.3);
        let out = BilateralDenoiser::default().denoise(5, 5, &pixels);
        assert!(out[12].x < 0.3);
        assert!(out[12].x > 0.1);
    }
}
