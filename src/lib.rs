// src/lib.rs
//! Braw Path Tracer
//!
//! A batched progressive path-tracing engine: scene graph and components,
//! BLAS/TLAS ray traversal, physically based shading, and image output.

pub mod accel;
pub mod asset;
pub mod core;
pub mod ecs;
pub mod engine;
pub mod gpu;
pub mod render;
pub mod scene;

// Re-export main types for convenience
pub use crate::core::error::EngineError;
pub use ecs::EntityId;
pub use engine::Engine;
pub use render::{FileType, PathTracer, RenderInfo, RenderState};
pub use scene::{
    Camera, Environment, Light, Material, Mesh, MeshId, MeshRegistry, Scene, Transform,
};

/// Creates a default engine instance
pub fn default() -> Result<Engine, EngineError> {
    Engine::new()
}
