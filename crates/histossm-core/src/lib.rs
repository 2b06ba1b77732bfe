//! # histossm-core
//!
//! Minimal tensor container, shape type and module trait shared by the
//! histossm layers. CPU-only, f32-only, no autograd: just enough structure
//! for the selective scan layer and the classifier heads built on it.

pub mod error;
pub mod module;
pub mod shape;
pub mod tensor;

pub use error::SsmError;
pub use module::Module;
pub use shape::Shape;
pub use tensor::Tensor;

pub type Result<T> = std::result::Result<T, SsmError>;
