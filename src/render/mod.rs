//! # Progressive path-tracing renderer
//!
//! Everything between a flattened scene and an image on disk: render job
//! configuration, the accumulation film, per-pixel sample streams, BSDF
//! models, the path-tracing integrator, image-space denoising, the image
//! writer, and the batched renderer that drives them.

pub mod brdf;
pub mod denoise;
pub mod export;
pub mod film;
pub mod info;
pub mod integrator;
pub mod renderer;
pub mod sampler;

pub use denoise::{BilateralDenoiser, Denoiser};
pub use film::Film;
pub use info::{FileType, RenderInfo};
pub use renderer::{PathTracer, RenderState};
