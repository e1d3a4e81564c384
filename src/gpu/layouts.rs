//! Shading-stage block layouts
//!
//! The `#[repr(C)]` structs copied into the per-frame device buffers. All
//! fields are explicitly padded to std140-style 16-byte boundaries; the
//! single `kind` discriminant is the tagged-variant dispatch point for the
//! ray-hit shading code.

use bytemuck::{Pod, Zeroable};

/// `kind` values for [`MaterialBlock`].
pub mod material_kind {
    pub const PBR: u32 = 0;
    pub const LAMBERT: u32 = 1;
    pub const VOLUME: u32 = 2;
    pub const SKYBOX: u32 = 3;
}

/// `kind` values for [`LightBlock`].
pub mod light_kind {
    pub const POINT: u32 = 0;
    pub const DIRECTIONAL: u32 = 1;
    pub const MESH_EMISSIVE: u32 = 2;
}

/// One material as consumed by hit shading.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialBlock {
    pub albedo: [f32; 3],
    pub kind: u32,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    pub sigma_t: f32,
    pub emissive: [f32; 3],
    pub asymmetry: f32,
}

/// One light instance: kind parameters plus the slots of the owning
/// object's transform and material so hit shading can resolve the emitter.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightBlock {
    pub color: [f32; 3],
    pub kind: u32,
    /// Position for point lights, direction for directional lights.
    pub vector: [f32; 3],
    pub intensity: f32,
    /// TLAS instance index of the emitting object, mesh lights only.
    pub instance: u32,
    /// Material slot of the emitting object, mesh lights only.
    pub material_slot: u32,
    pub _padding: [u32; 2],
}

/// Per-instance object description, rebuilt in lockstep with the top-level
/// acceleration structure so shading can resolve geometry and material data
/// by instance index.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectDescBlock {
    /// Mesh registry index standing in for the vertex/index device address.
    pub mesh: u32,
    pub material_slot: u32,
    pub triangle_count: u32,
    pub _padding: u32,
}
