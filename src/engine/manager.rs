//! Compute engine and device resource ownership.
//!
//! [`ComputeEngine`] is the process-level entry point. It owns one GPU device
//! and the three caches every batch draws from:
//!
//! * the library registry (append-only, kernel name index),
//! * the pipeline cache (keyed by kernel name, never evicted),
//! * the buffer cache (keyed by argument id, evicted per batch).
//!
//! ## Sharing
//!
//! The engine is a cheap `Clone` handle over an `Arc`. Each open batch holds a
//! clone of the same `Arc`, so device state stays alive until the last batch
//! and the last engine handle are gone.
//!
//! ## Concurrency
//!
//! Each table sits behind its own `Mutex`. When both are needed, the pipeline
//! cache is locked before the library registry. Batches never hold a lock
//! across a blocking device wait.
//!
//! ## Teardown
//!
//! Fields of [`EngineShared`] are dropped in declaration order: pipelines,
//! libraries and buffers are released before the device and queue.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::batch::{Batch, BatchBuilder};
use crate::engine::config::EngineConfig;
use crate::engine::error::{CompilationError, ComputeResult, RuntimeError};
use crate::gpu::{BufferCache, GPUContext, LibraryRegistry, PipelineCache};
use crate::profiler;

/// Device state shared by the engine and all of its open batches.
#[derive(Debug)]
pub(crate) struct EngineShared {
    pub(crate) pipelines: Mutex<PipelineCache>,
    pub(crate) libraries: Mutex<LibraryRegistry>,
    pub(crate) buffers: Mutex<BufferCache>,
    pub(crate) context: GPUContext,
}

impl EngineShared {
    pub(crate) fn pipelines(&self) -> Result<MutexGuard<'_, PipelineCache>, RuntimeError> {
        self.pipelines.lock().map_err(|_| RuntimeError::LockPoisoned { what: "pipeline cache" })
    }

    pub(crate) fn libraries(&self) -> Result<MutexGuard<'_, LibraryRegistry>, RuntimeError> {
        self.libraries.lock().map_err(|_| RuntimeError::LockPoisoned { what: "library registry" })
    }

    pub(crate) fn buffers(&self) -> Result<MutexGuard<'_, BufferCache>, RuntimeError> {
        self.buffers.lock().map_err(|_| RuntimeError::LockPoisoned { what: "buffer cache" })
    }
}

/// Entry point: compiles kernel libraries and opens batches.
///
/// ## Availability
/// Construction never fails. If no adapter or device can be acquired the
/// engine is created *unavailable*: [`available`](Self::available) returns
/// `false` and every device operation returns [`RuntimeError::Unavailable`].
///
/// ## Example
/// ```no_run
/// use batch_compute::{inout, ComputeEngine};
///
/// let engine = ComputeEngine::new();
/// engine.load_library(r#"
///     @group(0) @binding(0) var<storage, read_write> data: array<f32>;
///     @compute @workgroup_size(64)
///     fn double(@builtin(global_invocation_id) id: vec3<u32>) {
///         if (id.x < arrayLength(&data)) { data[id.x] = data[id.x] * 2.0; }
///     }
/// "#)?;
///
/// let mut values = vec![1.0f32; 256];
/// engine
///     .new_batch()?
///     .with_grid(1, 256, 1, 64)
///     .call("double", (inout(&mut values),))?
///     .dispatch()?
///     .wait()?;
/// assert!(values.iter().all(|&v| v == 2.0));
/// # Ok::<(), batch_compute::ComputeError>(())
/// ```
#[derive(Clone, Debug)]
pub struct ComputeEngine {
    shared: Option<Arc<EngineShared>>,
}

impl ComputeEngine {
    /// Creates an engine configured from the environment
    /// (see [`EngineConfig::from_env`]).
    pub fn new() -> Self {
        Self::with_config(EngineConfig::from_env())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let _g = profiler::span("ComputeEngine::init");

        match GPUContext::new(&config) {
            Ok(context) => Self {
                shared: Some(Arc::new(EngineShared {
                    pipelines: Mutex::new(PipelineCache::new()),
                    libraries: Mutex::new(LibraryRegistry::new()),
                    buffers: Mutex::new(BufferCache::new()),
                    context,
                })),
            },
            Err(e) => {
                log::warn!("compute engine unavailable: {e}");
                Self { shared: None }
            }
        }
    }

    /// Whether a device was acquired.
    #[inline]
    pub fn available(&self) -> bool {
        self.shared.is_some()
    }

    fn shared(&self) -> Result<&Arc<EngineShared>, RuntimeError> {
        self.shared.as_ref().ok_or(RuntimeError::Unavailable)
    }

    /// Compiles WGSL source and registers every compute kernel it exports.
    ///
    /// Later libraries override earlier ones for same-named kernels. A kernel
    /// whose pipeline is already cached keeps that pipeline.
    ///
    /// ## Errors
    /// * `Compilation` with the compiler diagnostic; nothing is registered.
    /// * `Runtime` if the engine is unavailable.
    pub fn load_library(&self, source: &str) -> ComputeResult<()> {
        let _g = profiler::span("ComputeEngine::load_library");

        let shared = self.shared()?;
        let mut libraries = shared.libraries()?;
        let names = libraries
            .load(&shared.context, source)
            .inspect_err(|e: &CompilationError| log::debug!("library rejected: {e}"))?;

        log::info!("loaded library {} exporting {:?}", libraries.len() - 1, names);
        Ok(())
    }

    /// Whether any loaded library exports `name`.
    ///
    /// Always `false` on an unavailable engine.
    pub fn contains_function(&self, name: &str) -> bool {
        self.shared()
            .and_then(|shared| shared.libraries())
            .map(|libraries| libraries.contains(name))
            .unwrap_or(false)
    }

    /// Opens a new batch with its own command stream.
    ///
    /// ## Errors
    /// `Runtime(Unavailable)` if the engine has no device.
    pub fn new_batch<'a>(&self) -> ComputeResult<BatchBuilder<'a>> {
        let shared = Arc::clone(self.shared()?);
        Ok(BatchBuilder::new(Batch::new(shared)))
    }

    /// Sorted names of all loaded kernels.
    pub fn function_names(&self) -> ComputeResult<Vec<String>> {
        Ok(self.shared()?.libraries()?.function_names())
    }

    /// Number of loaded libraries.
    pub fn library_count(&self) -> ComputeResult<usize> {
        Ok(self.shared()?.libraries()?.len())
    }

    /// Number of cached pipelines.
    pub fn pipeline_count(&self) -> ComputeResult<usize> {
        Ok(self.shared()?.pipelines()?.len())
    }

    /// Number of device buffers currently held by open batches.
    pub fn live_buffer_count(&self) -> ComputeResult<usize> {
        Ok(self.shared()?.buffers()?.len())
    }

    /// Adapter the device was created from.
    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.shared.as_ref().map(|shared| &shared.context.adapter_info)
    }
}

impl Default for ComputeEngine {
    fn default() -> Self {
        Self::new()
    }
}
