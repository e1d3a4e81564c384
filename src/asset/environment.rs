//! Environment map import
//!
//! Decodes an equirectangular panorama (HDR, EXR, or any LDR format the
//! image crate reads) into linear radiance for environment lookups.

use std::path::Path;

use cgmath::Vector3;
use log::info;

use crate::core::error::EngineError;
use crate::scene::environment::Environment;

/// Loads `path` as an equirectangular environment.
pub fn import_environment(path: &Path) -> Result<Environment, EngineError> {
    if !path.exists() {
        return Err(EngineError::AssetMissing {
            path: path.display().to_string(),
        });
    }
    let image = image::open(path)?.to_rgb32f();
    let (width, height) = image.dimensions();
    let pixels = image
        .pixels()
        .map(|p| Vector3::new(p.0[0], p.0[1], p.0[2]))
        .collect();
    info!("imported environment {} ({}x{})", path.display(), width, height);
    Ok(Environment::Equirect {
        width,
        height,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_environment_is_asset_missing() {
        let err = import_environment(Path::new("/nonexistent/sky.hdr")).unwrap_err();
        assert!(matches!(err, EngineError::AssetMissing { .. }));
    }

    #[test]
    fn round_trips_a_png_panorama() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.png");
        let mut img = image::RgbImage::new(4, 2);
        for p in img.pixels_mut() {
            *p = image::Rgb([255, 0, 0]);
        }
        img.save(&path).unwrap();

        let env = import_environment(&path).unwrap();
        let radiance = env.radiance(Vector3::new(0.0, 1.0, 0.0));
        assert!(radiance.x > 0.9);
        assert!(radiance.y < 0.1);
    }
}
