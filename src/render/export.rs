//! Image output
//!
//! Writes the accumulated radiance image in the four supported encodings.
//! LDR formats (PNG, JPEG) are tonemapped with a clamp and the sRGB
//! transfer curve; HDR formats (Radiance HDR, OpenEXR) keep linear
//! radiance.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use cgmath::Vector3;
use image::codecs::hdr::HdrEncoder;
use image::{ImageFormat, Rgb, Rgb32FImage, RgbImage};
use log::info;

use crate::core::error::EngineError;
use crate::render::info::FileType;

/// Linear radiance to 8-bit sRGB.
fn srgb_encode(linear: f32) -> u8 {
    let c = linear.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0 + 0.5) as u8
}

/// Writes `pixels` (row-major, linear radiance) to `path` in the given
/// encoding. Returns the written path.
pub fn write_image(
    path: &Path,
    file_type: FileType,
    width: u32,
    height: u32,
    pixels: &[Vector3<f32>],
) -> Result<PathBuf, EngineError> {
    debug_assert_eq!(pixels.len(), (width * height) as usize);
    match file_type {
        FileType::Png | FileType::Jpeg => {
            let mut image = RgbImage::new(width, height);
            for (i, pixel) in pixels.iter().enumerate() {
                let x = i as u32 % width;
                let y = i as u32 / width;
                image.put_pixel(
                    x,
                    y,
                    Rgb([srgb_encode(pixel.x), srgb_encode(pixel.y), srgb_encode(pixel.z)]),
                );
            }
            let format = if file_type == FileType::Png {
                ImageFormat::Png
            } else {
                ImageFormat::Jpeg
            };
            image.save_with_format(path, format)?;
        }
        FileType::Hdr => {
            let file = File::create(path)?;
            let rgb: Vec<Rgb<f32>> = pixels.iter().map(|p| Rgb([p.x, p.y, p.z])).collect();
            HdrEncoder::new(BufWriter::new(file))
                .encode(&rgb, width as usize, height as usize)?;
        }
        FileType::Exr => {
            let flat: Vec<f32> = pixels.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
            let image = Rgb32FImage::from_raw(width, height, flat)
                .ok_or_else(|| EngineError::device("EXR buffer dimension mismatch"))?;
            image.save_with_format(path, ImageFormat::OpenExr)?;
        }
    }
    info!("wrote {}", path.display());
    Ok(path.to_path_buf())
}
