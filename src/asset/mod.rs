//! # Asset import
//!
//! File-to-scene bridges: OBJ models with MTL materials, and
//! equirectangular environment panoramas.

pub mod environment;
pub mod obj;

pub use environment::import_environment;
pub use obj::import_model;
