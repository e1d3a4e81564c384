//! # Core Utilities
//!
//! Foundation types shared across the engine: the error taxonomy, the
//! fixed-capacity slot allocator, and the generational pool used for
//! stale-handle detection.

pub mod error;
pub mod generational;
pub mod pool;

pub use error::EngineError;
pub use generational::{GenerationalPool, Handle};
pub use pool::FreeList;
