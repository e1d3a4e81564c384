//! Progressive accumulation buffer
//!
//! Stores the running per-pixel mean radiance in double precision so
//! incremental averaging stays stable over thousands of samples.

use cgmath::Vector3;

/// Accumulation target for a progressive render.
pub struct Film {
    width: u32,
    height: u32,
    mean: Vec<Vector3<f64>>,
    samples_done: u32,
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mean: vec![Vector3::new(0.0, 0.0, 0.0); (width * height) as usize],
            samples_done: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples_done(&self) -> u32 {
        self.samples_done
    }

    /// Folds one batch of per-pixel radiance sums into the running mean.
    ///
    /// `batch_sums[i]` is the sum of `batch_size` sample values for pixel
    /// `i`. The update is the incremental average
    /// `(mean * n + sum) / (n + batch_size)`, so the stored image is always
    /// the mean over every sample accumulated so far.
    pub fn accumulate(&mut self, batch_sums: &[Vector3<f64>], batch_size: u32) {
        debug_assert_eq!(batch_sums.len(), self.mean.len());
        let n = self.samples_done as f64;
        let total = n + batch_size as f64;
        for (mean, sum) in self.mean.iter_mut().zip(batch_sums) {
            *mean = (*mean * n + *sum) / total;
        }
        self.samples_done += batch_size;
    }

    /// Current mean image as single-precision RGB for denoising and export.
    pub fn snapshot(&self) -> Vec<Vector3<f32>> {
        self.mean
            .iter()
            .map(|c| Vector3::new(c.x as f32, c.y as f32, c.z as f32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_mean_matches_full_average() {
        let mut film = Film::new(1, 1);
        // Two batches of 2 samples: values 1, 3 then 5, 7. Mean = 4.
        film.accumulate(&[Vector3::new(4.0, 4.0, 4.0)], 2);
        film.accumulate(&[Vector3::new(12.0, 12.0, 12.0)], 2);
        let out = film.snapshot();
        assert!((out[0].x - 4.0).abs() < 1e-6);
        assert_eq!(film.samples_done(), 4);
    }
}
