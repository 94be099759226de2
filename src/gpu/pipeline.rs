//! # Compute Pipeline Cache
//!
//! Pipelines are created lazily, the first time a kernel is called, and are
//! retained for the lifetime of the engine. The cache is keyed by kernel name
//! only: once a name has a pipeline, loading another library that exports the
//! same name does not rebuild it.
//!
//! Pipelines use automatic layout derivation. The `@group(0)` layout is
//! fetched once at creation and stored alongside the pipeline so bind groups
//! can be built without touching the pipeline again.

use std::collections::HashMap;

use crate::engine::error::FunctionNotFoundError;
use crate::gpu::context::GPUContext;
use crate::gpu::library::{KernelInfo, LibraryRegistry};

/// Dispatch-ready form of one kernel.
#[derive(Clone, Debug)]
pub struct KernelPipeline {
    /// Backend pipeline.
    pub pipeline: wgpu::ComputePipeline,

    /// `@group(0)` layout; `None` when the kernel binds nothing.
    pub bind_group_layout: Option<wgpu::BindGroupLayout>,

    /// Reflection data captured when the pipeline was built.
    pub kernel: KernelInfo,
}

/// Name-keyed, never-evicted pipeline table.
#[derive(Debug, Default)]
pub struct PipelineCache {
    map: HashMap<String, KernelPipeline>,
}

impl PipelineCache {
    /// Creates an empty pipeline cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for `name`, building it on first use.
    ///
    /// ## Errors
    /// * `Missing` if no library in `libraries` exports `name`.
    /// * `PipelineFailed` if the backend rejects the pipeline.
    pub fn get_or_create(
        &mut self,
        context: &GPUContext,
        libraries: &LibraryRegistry,
        name: &str,
    ) -> Result<KernelPipeline, FunctionNotFoundError> {
        if let Some(found) = self.map.get(name) {
            return Ok(found.clone());
        }

        let (library, kernel) = libraries
            .resolve(name)
            .ok_or_else(|| FunctionNotFoundError::Missing { name: name.to_owned() })?;

        let created = context.scoped(|device| {
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: None,
                module: &library.module,
                entry_point: Some(name),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            let bind_group_layout =
                (!kernel.bindings.is_empty()).then(|| pipeline.get_bind_group_layout(0));
            (pipeline, bind_group_layout)
        });

        let (pipeline, bind_group_layout) = created.map_err(|message| {
            FunctionNotFoundError::PipelineFailed { name: name.to_owned(), message }
        })?;

        log::debug!(
            "compiled pipeline '{name}' (workgroup {:?}, bindings {:?})",
            kernel.workgroup_size,
            kernel.bindings
        );

        let entry = KernelPipeline { pipeline, bind_group_layout, kernel: kernel.clone() };
        self.map.insert(name.to_owned(), entry.clone());
        Ok(entry)
    }

    /// Number of cached pipelines.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}
