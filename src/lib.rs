//! # Batch Compute
//!
//! Batched GPU compute dispatch on top of `wgpu`.
//!
//! Kernels are written in WGSL and loaded into a [`ComputeEngine`] as
//! libraries. Work is described as a batch: a sequence of kernel calls, each
//! with its own thread grid and positional arguments, recorded into one
//! command stream, submitted once, and waited on once.
//!
//! ## Design Goals
//! - One command stream per batch, one blocking point per batch
//! - Argument kinds (`In`, `Out`, `InOut`, `Private`, `Shared`) decide
//!   allocation, transfer and copy-back
//! - Compiled pipelines cached by kernel name for the life of the engine
//! - Device buffers released deterministically when the batch is dropped
//! - Host memory borrowed for exactly as long as the batch can write it
//!
//! ## Example
//! ```no_run
//! use batch_compute::prelude::*;
//!
//! let engine = ComputeEngine::new();
//! engine.load_library(r#"
//!     @group(0) @binding(0) var<storage, read> a: array<f32>;
//!     @group(0) @binding(1) var<storage, read_write> b: array<f32>;
//!     @compute @workgroup_size(8, 8)
//!     fn add(@builtin(global_invocation_id) id: vec3<u32>) {
//!         let i = id.y * 64u + id.x;
//!         if (id.x < 64u && id.y < 64u) { b[i] = a[i] + b[i]; }
//!     }
//! "#)?;
//!
//! let a = vec![1.0f32; 64 * 64];
//! let mut b = vec![2.0f32; 64 * 64];
//! engine
//!     .new_batch()?
//!     .with_grid(64, 64, 8, 8)
//!     .call("add", (&a, inout(&mut b)))?
//!     .dispatch()?
//!     .wait()?;
//! assert!(b.iter().all(|&v| v == 3.0));
//! # Ok::<(), ComputeError>(())
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;
pub mod profiling;

mod gpu;

pub use profiling::profiler;

#[doc(hidden)]
pub use bytemuck;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Engine and batch protocol

pub use engine::manager::ComputeEngine;

pub use engine::batch::{
    Batch,
    BatchBuilder,
    BatchState,
    BufferDescriptor,
    CallBuilder,
    CallError,
    Gate,
};

// Argument model

pub use engine::args::{
    input,
    inout,
    output,
    private,
    shared,
    ArgumentBuffer,
    HostData,
    HostDataMut,
    KernelArgs,
};

pub use engine::config::EngineConfig;

pub use engine::error::{
    ComputeResult,
    ComputeError,
    CompilationError,
    FunctionNotFoundError,
    RuntimeError,
};

pub use engine::types::{
    ArgumentId,
    BatchID,
    BufferKind,
    GridShape,
    SlotIndex,
    StorageMode,
};

// Kernel reflection (no device required)

pub use gpu::{reflect_kernels, KernelInfo};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types and argument wrappers.
///
/// Import with:
/// ```rust
/// use batch_compute::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ComputeEngine,
        ComputeError,
        ComputeResult,
        BufferKind,
        GridShape,
        Gate,
        input,
        inout,
        output,
        private,
        shared,
    };
}
