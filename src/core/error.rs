//! Engine error taxonomy
//!
//! Every fallible engine operation surfaces one of these variants
//! synchronously to the caller. There are no background retry queues:
//! allocation and resource-creation failures propagate immediately.

use thiserror::Error;

use crate::ecs::ComponentKind;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A fixed-capacity pool has no free slot left.
    ///
    /// Recoverable by the caller through pre-sizing; otherwise a hard
    /// failure for the creation request that hit it.
    #[error("{kind} pool exhausted (capacity {capacity})")]
    PoolExhausted { kind: &'static str, capacity: usize },

    /// An entity was queried for a component kind it does not have.
    ///
    /// Always a caller logic error, never retried.
    #[error("entity {entity} has no {kind:?} component")]
    ComponentNotFound { entity: u64, kind: ComponentKind },

    /// A referenced asset file does not exist or failed to parse.
    #[error("asset missing or unreadable: {path}")]
    AssetMissing { path: String },

    /// Device-side resource creation failed (buffer allocation,
    /// acceleration structure build). Fatal for the operation; logged
    /// critically by the caller, never retried automatically.
    #[error("device resource failure: {what}")]
    DeviceResourceFailure { what: String },

    /// Filesystem access failed while reading an asset or writing output.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding an image file failed.
    #[error("image codec failure: {0}")]
    Image(#[from] image::ImageError),
}

impl EngineError {
    /// Shorthand for a device resource failure with a formatted description.
    pub fn device(what: impl Into<String>) -> Self {
        Self::DeviceResourceFailure { what: what.into() }
    }
}
