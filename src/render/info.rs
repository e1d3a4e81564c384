//! Render job configuration

use std::path::PathBuf;

/// Output encodings supported by the image writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Png,
    Hdr,
    Exr,
    Jpeg,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Png => "png",
            FileType::Hdr => "hdr",
            FileType::Exr => "exr",
            FileType::Jpeg => "jpg",
        }
    }
}

/// Everything the caller sets before invoking a render.
#[derive(Debug, Clone)]
pub struct RenderInfo {
    pub width: u32,
    pub height: u32,
    /// Total samples per pixel to accumulate.
    pub samples: u32,
    /// Samples accumulated per dispatch before an intermediate readback.
    pub batch_size: u32,
    pub file_type: FileType,
    /// Apply the image-space denoiser to the final accumulated image.
    pub denoise: bool,
    /// Write every batch's accumulated image, not just the final one.
    pub write_all_files: bool,
    /// Output path without extension.
    pub filename: String,
    /// Base seed for the per-pixel sample streams.
    pub seed: u64,
}

impl Default for RenderInfo {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            samples: 256,
            batch_size: 64,
            file_type: FileType::Png,
            denoise: false,
            write_all_files: false,
            filename: "render".to_string(),
            seed: 0,
        }
    }
}

impl RenderInfo {
    /// Final output path: `<filename>.<ext>`.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.filename, self.file_type.extension()))
    }

    /// Intermediate output path for `batch_index` (1-based):
    /// `<filename><batch_index>.<ext>`. Monotonic and collision-free.
    pub fn batch_output_path(&self, batch_index: u32) -> PathBuf {
        PathBuf::from(format!(
            "{}{}.{}",
            self.filename,
            batch_index,
            self.file_type.extension()
        ))
    }

    /// Number of dispatches needed to reach the sample target.
    pub fn batch_count(&self) -> u32 {
        self.samples.div_ceil(self.batch_size.max(1))
    }
}
