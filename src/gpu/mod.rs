//! # GPU Backend
//!
//! Thin layer over `wgpu` and `naga` holding everything the engine caches on
//! the device side:
//!
//! * [`context`]: adapter, device and queue acquisition, validation scopes
//! * [`library`]: WGSL compilation, kernel reflection, name index
//! * [`pipeline`]: name-keyed compute pipeline cache
//! * [`resource`]: id-keyed device buffer cache
//!
//! The batch protocol in [`crate::engine::batch`] is the only consumer.

pub mod context;
pub mod library;
pub mod pipeline;
pub mod resource;

pub use context::GPUContext;
pub use library::{reflect_kernels, KernelInfo, LibraryRegistry};
pub use pipeline::PipelineCache;
pub use resource::BufferCache;
