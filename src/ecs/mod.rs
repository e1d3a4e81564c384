//! # Entity-Component Store
//!
//! Associates opaque scene entities with typed component records drawn from
//! fixed-capacity generational pools. Component kinds are a closed enum
//! (mesh reference, material, light) looked up by array index per entity;
//! records may be exclusively owned or shared across entities through a
//! reference count stored alongside the record.

pub mod entity;
pub mod store;

pub use entity::{EntityAllocator, EntityId};
pub use store::{ComponentKind, ComponentStore, MeshComponent};
