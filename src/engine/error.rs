//! Error types for kernel compilation, pipeline resolution, and GPU execution.
//!
//! Errors are split by the operation that raises them so that callers can
//! react to each failure mode separately:
//!
//! * [`CompilationError`]: kernel source failed to build in
//!   [`load_library`](crate::ComputeEngine::load_library). Carries the
//!   compiler diagnostic. No library is registered when this is returned.
//! * [`FunctionNotFoundError`]: a kernel name has no exporting library, or
//!   its pipeline could not be built. Raised while binding a call; dispatches
//!   already recorded in the same batch are unaffected.
//! * [`RuntimeError`]: every other backend failure (no device, validation
//!   failures while binding or submitting, device loss while waiting).
//!
//! All three convert into the aggregate [`ComputeError`] so higher-level code
//! can use `?` and match on the variant it cares about.
//!
//! ## Propagation
//! Errors are returned synchronously to the call site that triggered them.
//! Nothing is retried automatically; reloading corrected source and retrying
//! the call is the caller's responsibility.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] gives short single-line messages for logs (diagnostics
//!   from the shader compiler may span several lines).
//! * [`fmt::Debug`] (derived) keeps the full structure.

use std::fmt;

use crate::engine::types::{ArgumentId, GridShape};

/// Returned when kernel source fails to parse, validate, or build.
///
/// ### Fields
/// * `diagnostic` - The compiler's rendered diagnostic, including source spans.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    /// Rendered compiler diagnostic.
    pub diagnostic: String,
}

impl CompilationError {
    /// Creates a compilation error from a rendered diagnostic.
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self { diagnostic: diagnostic.into() }
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel compilation failed: {}", self.diagnostic)
    }
}

impl std::error::Error for CompilationError {}

/// Returned when a kernel cannot be resolved into a dispatchable pipeline.
///
/// ### Variants
/// * `Missing` - No loaded library exports the kernel.
/// * `PipelineFailed` - The kernel exists but pipeline creation failed; the
///   backend diagnostic is preserved.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionNotFoundError {
    /// No loaded library exports `name`.
    Missing {
        /// Requested kernel name.
        name: String,
    },

    /// The kernel exists but its pipeline could not be built.
    PipelineFailed {
        /// Requested kernel name.
        name: String,

        /// Backend diagnostic.
        message: String,
    },
}

impl FunctionNotFoundError {
    /// Name of the kernel that could not be resolved.
    pub fn name(&self) -> &str {
        match self {
            FunctionNotFoundError::Missing { name } => name,
            FunctionNotFoundError::PipelineFailed { name, .. } => name,
        }
    }
}

impl fmt::Display for FunctionNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionNotFoundError::Missing { name } => write!(f, "function not found: {name}"),
            FunctionNotFoundError::PipelineFailed { name, message } => {
                write!(f, "could not build pipeline for function {name}: {message}")
            }
        }
    }
}

impl std::error::Error for FunctionNotFoundError {}

/// Backend failures outside compilation and kernel resolution.
///
/// ## Notes
/// Most variants carry the backend's message verbatim. None of them are
/// recovered internally.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The engine has no device; check [`available`](crate::ComputeEngine::available).
    Unavailable,

    /// Adapter or device request failed during engine construction.
    DeviceRequestFailed {
        /// Backend message.
        message: String,
    },

    /// A shared table lock was poisoned by a panicking thread.
    LockPoisoned {
        /// Which table was poisoned.
        what: &'static str,
    },

    /// A workgroup dimension was zero.
    InvalidGrid {
        /// Geometry supplied to `with_grid`.
        grid: GridShape,
    },

    /// The grid's workgroup differs from the kernel's `@workgroup_size`.
    WorkgroupMismatch {
        /// Kernel name.
        kernel: String,

        /// Workgroup requested through `with_grid`, in device order.
        requested: [u32; 3],

        /// Workgroup declared by the kernel, in device order.
        declared: [u32; 3],
    },

    /// The kernel reads a slot that the call did not supply.
    ArgumentCountMismatch {
        /// Kernel name.
        kernel: String,

        /// Highest slot used by the kernel, plus one.
        expected: usize,

        /// Number of arguments supplied.
        supplied: usize,
    },

    /// A size override exceeds the borrowed host region.
    ArgumentTooLarge {
        /// Argument id.
        id: ArgumentId,

        /// Requested size in bytes.
        size: usize,

        /// Bytes actually borrowed.
        capacity: usize,
    },

    /// A device buffer could not be allocated for an argument.
    AllocationFailed {
        /// Argument id.
        id: ArgumentId,

        /// Requested size in bytes, after padding.
        size: u64,

        /// Backend message.
        message: String,
    },

    /// Creating the bind group for a call failed validation.
    BindingFailed {
        /// Kernel name.
        kernel: String,

        /// Backend message.
        message: String,
    },

    /// The batch encoder was already closed.
    EncoderClosed,

    /// Finishing or submitting the command stream failed validation.
    SubmissionFailed {
        /// Backend message.
        message: String,
    },

    /// Waiting for the device failed (typically device loss).
    WaitFailed {
        /// Backend message.
        message: String,
    },

    /// Mapping a buffer for copy-back failed.
    ReadbackFailed {
        /// Argument id whose buffer could not be mapped.
        id: ArgumentId,

        /// Backend message.
        message: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Unavailable => f.write_str("no GPU device available"),
            RuntimeError::DeviceRequestFailed { message } => {
                write!(f, "failed to acquire GPU device: {message}")
            }
            RuntimeError::LockPoisoned { what } => write!(f, "lock poisoned: {what}"),
            RuntimeError::InvalidGrid { grid } => {
                write!(f, "workgroup dimensions must be non-zero: {grid}")
            }
            RuntimeError::WorkgroupMismatch { kernel, requested, declared } => write!(
                f,
                "kernel {kernel} declares workgroup {declared:?} but {requested:?} was requested"
            ),
            RuntimeError::ArgumentTooLarge { id, size, capacity } => write!(
                f,
                "argument {id} size {size} exceeds borrowed host region of {capacity} bytes"
            ),
            RuntimeError::ArgumentCountMismatch { kernel, expected, supplied } => write!(
                f,
                "kernel {kernel} binds {expected} argument slots but {supplied} were supplied"
            ),
            RuntimeError::AllocationFailed { id, size, message } => {
                write!(f, "failed to allocate {size} bytes for argument {id}: {message}")
            }
            RuntimeError::BindingFailed { kernel, message } => {
                write!(f, "failed to bind arguments for kernel {kernel}: {message}")
            }
            RuntimeError::EncoderClosed => f.write_str("batch encoder is closed"),
            RuntimeError::SubmissionFailed { message } => {
                write!(f, "command submission failed: {message}")
            }
            RuntimeError::WaitFailed { message } => write!(f, "waiting for device failed: {message}"),
            RuntimeError::ReadbackFailed { id, message } => {
                write!(f, "failed to read back argument {id}: {message}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Aggregate error returned by every fallible engine operation.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// Kernel source failed to build.
    Compilation(CompilationError),

    /// A kernel could not be resolved into a pipeline.
    FunctionNotFound(FunctionNotFoundError),

    /// Any other backend failure.
    Runtime(RuntimeError),
}

impl ComputeError {
    /// Whether this is a compilation failure.
    pub fn is_compilation(&self) -> bool {
        matches!(self, ComputeError::Compilation(_))
    }

    /// Whether this is a kernel resolution failure.
    pub fn is_function_not_found(&self) -> bool {
        matches!(self, ComputeError::FunctionNotFound(_))
    }

    /// Whether this is a runtime failure.
    pub fn is_runtime(&self) -> bool {
        matches!(self, ComputeError::Runtime(_))
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::Compilation(e) => write!(f, "{e}"),
            ComputeError::FunctionNotFound(e) => write!(f, "{e}"),
            ComputeError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ComputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComputeError::Compilation(e) => Some(e),
            ComputeError::FunctionNotFound(e) => Some(e),
            ComputeError::Runtime(e) => Some(e),
        }
    }
}

impl From<CompilationError> for ComputeError {
    fn from(e: CompilationError) -> Self { ComputeError::Compilation(e) }
}

impl From<FunctionNotFoundError> for ComputeError {
    fn from(e: FunctionNotFoundError) -> Self { ComputeError::FunctionNotFound(e) }
}

impl From<RuntimeError> for ComputeError {
    fn from(e: RuntimeError) -> Self { ComputeError::Runtime(e) }
}

/// Result alias used throughout the crate.
pub type ComputeResult<T> = Result<T, ComputeError>;
