//! # Scene Management
//!
//! The scene data model: transforms with derived bases, immutable meshes
//! and procedural primitives, tagged-variant materials and lights, the
//! camera, environment lighting, and the scene graph itself.

pub mod camera;
pub mod environment;
pub mod light;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod transform;

pub use camera::Camera;
pub use environment::Environment;
pub use light::{Light, LightParams};
pub use material::{Material, MaterialKind, MaterialParams};
pub use mesh::{Mesh, MeshId, MeshRegistry, Vertex};
pub use scene::{RenderObject, Scene, SceneObject};
pub use transform::Transform;
