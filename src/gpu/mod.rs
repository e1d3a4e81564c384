//! # GPU Data Block Management
//!
//! Maps typed CPU structs onto aligned regions of device-visible buffers.
//! Each block has a stable index, a dirty flag per frame-in-flight, and is
//! flushed as a whole region before the frame that reads it is dispatched.

pub mod buffer;
pub mod data_block;
pub mod layouts;

pub use buffer::DeviceBuffer;
pub use data_block::DataBlockManager;
pub use layouts::{LightBlock, MaterialBlock, ObjectDescBlock};
