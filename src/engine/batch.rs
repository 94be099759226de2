//! # Batch Protocol
//!
//! A [`Batch`] is one logical unit of GPU work: one command encoder, one open
//! compute pass, and the set of device buffers its calls have touched.
//!
//! ## Builder states
//!
//! The batch moves through three owning wrappers, so an out-of-order step is
//! a compile error rather than a runtime one:
//!
//! ```text
//! ComputeEngine::new_batch ─► BatchBuilder ──with_grid──► CallBuilder
//!                                 ▲   │                        │
//!                                 └───┼────────call────────────┘
//!                                     └──dispatch──► Gate ──wait──► host updated
//! ```
//!
//! * [`BatchBuilder::with_grid`] stores the dispatch geometry.
//! * [`CallBuilder::call`] resolves the pipeline, checks the grid's workgroup
//!   against the kernel's `@workgroup_size`, registers every argument, binds
//!   argument `i` to `@group(0) @binding(i)` and records one dispatch.
//! * [`BatchBuilder::dispatch`] closes the pass, records copy-back transfers
//!   and submits the command stream.
//! * [`Gate::wait`] blocks until the device finishes and copies results into
//!   host memory. It may be called any number of times.
//!
//! A failed call hands the builder back inside [`CallError`], so calls that
//! were already recorded can still be dispatched.
//!
//! ## Buffer registration
//!
//! Within one batch each argument id resolves to exactly one
//! [`BufferDescriptor`]. Binding the same argument (by reference) to several
//! calls reuses its device buffer, which is how `Private` scratch storage
//! survives from one call to the next.
//!
//! ## Copy-back
//!
//! | kind      | source at wait                                   |
//! |-----------|--------------------------------------------------|
//! | `Out`     | staging buffer filled at submit                  |
//! | `InOut`   | staging buffer filled at submit                  |
//! | `Shared`  | the device buffer itself when the device can map it, staging otherwise |
//! | `In`      | none                                             |
//! | `Private` | none                                             |
//!
//! Exactly `size` bytes are written to the host address of each argument.
//!
//! ## Release
//!
//! Dropping the batch (by dropping whichever builder or gate currently owns
//! it) ends the pass and evicts every buffer the batch registered from the
//! engine's buffer cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use crate::engine::args::{ArgumentBuffer, KernelArgs};
use crate::engine::error::{ComputeError, ComputeResult, RuntimeError};
use crate::engine::manager::EngineShared;
use crate::engine::types::{ArgumentId, BatchID, BufferKind, GridShape};
use crate::gpu::resource::create_readback;
use crate::profiler::{self, Arg};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    /// Calls may still be recorded.
    Recording,

    /// The command stream has been handed to the device.
    Submitted,
}

/// One argument resolved against the device for the duration of a batch.
#[derive(Debug)]
pub struct BufferDescriptor<'a> {
    argument: ArgumentBuffer<'a>,
    buffer: wgpu::Buffer,
    readback: Option<wgpu::Buffer>,
}

impl<'a> BufferDescriptor<'a> {
    /// Argument this descriptor was created for.
    pub fn argument(&self) -> &ArgumentBuffer<'a> {
        &self.argument
    }

    /// Device allocation size in bytes.
    pub fn device_size(&self) -> u64 {
        self.buffer.size()
    }

    /// Buffer mapped at wait time, if any.
    fn copy_back_source(&self, shared_is_mappable: bool) -> Option<&wgpu::Buffer> {
        if !self.argument.kind().copies_back() {
            return None;
        }
        match &self.readback {
            Some(staging) => Some(staging),
            None if self.argument.kind() == BufferKind::Shared && shared_is_mappable => {
                Some(&self.buffer)
            }
            None => None,
        }
    }
}

/// A single command stream and the device buffers it references.
pub struct Batch<'a> {
    id: BatchID,
    shared: Arc<EngineShared>,
    pass: Option<wgpu::ComputePass<'static>>,
    encoder: Option<wgpu::CommandEncoder>,
    descriptors: HashMap<ArgumentId, BufferDescriptor<'a>>,
    order: Vec<ArgumentId>,
    grid: GridShape,
    calls: usize,
    state: BatchState,
    submission: Option<wgpu::SubmissionIndex>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        let id = NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed);

        let mut encoder =
            shared.context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("batch_compute_encoder"),
            });
        let pass = encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("batch_compute_pass"),
                timestamp_writes: None,
            })
            .forget_lifetime();

        log::debug!("batch {id} opened");

        Self {
            id,
            shared,
            pass: Some(pass),
            encoder: Some(encoder),
            descriptors: HashMap::new(),
            order: Vec::new(),
            grid: GridShape::default(),
            calls: 0,
            state: BatchState::Recording,
            submission: None,
        }
    }

    /// Batch identifier (logging only).
    #[inline]
    pub fn id(&self) -> BatchID {
        self.id
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Geometry used by the next call.
    #[inline]
    pub fn grid(&self) -> GridShape {
        self.grid
    }

    /// Number of dispatches recorded so far.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.calls
    }

    /// Number of distinct arguments registered so far.
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Descriptor registered for `id`, if any.
    pub fn descriptor(&self, id: ArgumentId) -> Option<&BufferDescriptor<'a>> {
        self.descriptors.get(&id)
    }

    fn register(&mut self, argument: ArgumentBuffer<'a>) -> Result<wgpu::Buffer, RuntimeError> {
        let id = argument.id();
        if let Some(existing) = self.descriptors.get(&id) {
            return Ok(existing.buffer.clone());
        }

        let buffer = self.shared.buffers()?.get_or_create(&self.shared.context, &argument)?;
        self.descriptors
            .insert(id, BufferDescriptor { argument, buffer: buffer.clone(), readback: None });
        self.order.push(id);
        Ok(buffer)
    }

    fn call(&mut self, kernel: &str, arguments: Vec<ArgumentBuffer<'a>>) -> ComputeResult<()> {
        let _g = profiler::span("Batch::call").arg("batch", Arg::U64(self.id));

        if self.state != BatchState::Recording || self.pass.is_none() {
            return Err(RuntimeError::EncoderClosed.into());
        }

        let counts = self
            .grid
            .workgroup_counts()
            .ok_or(RuntimeError::InvalidGrid { grid: self.grid })?;

        let shared = Arc::clone(&self.shared);
        let compiled = {
            let mut pipelines = shared.pipelines()?;
            let libraries = shared.libraries()?;
            pipelines.get_or_create(&shared.context, &libraries, kernel)?
        };

        // The device runs the kernel's own workgroup; counts only cover the
        // grid when the two agree.
        let declared = compiled.kernel.workgroup_size;
        if declared != self.grid.workgroup_extent() {
            return Err(RuntimeError::WorkgroupMismatch {
                kernel: kernel.to_owned(),
                requested: self.grid.workgroup_extent(),
                declared,
            }
            .into());
        }

        let supplied = arguments.len();
        let expected = compiled.kernel.required_slots();
        if expected > supplied {
            return Err(RuntimeError::ArgumentCountMismatch {
                kernel: kernel.to_owned(),
                expected,
                supplied,
            }
            .into());
        }

        let mut slots: Vec<wgpu::Buffer> = Vec::with_capacity(supplied);
        for argument in arguments {
            slots.push(self.register(argument)?);
        }

        let bind_group = match &compiled.bind_group_layout {
            Some(layout) => {
                let entries: Vec<wgpu::BindGroupEntry<'_>> = compiled
                    .kernel
                    .bindings
                    .iter()
                    .map(|&binding| wgpu::BindGroupEntry {
                        binding,
                        resource: slots[binding as usize].as_entire_binding(),
                    })
                    .collect();

                let created = shared.context.scoped(|device| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(kernel),
                        layout,
                        entries: &entries,
                    })
                });
                Some(created.map_err(|message| RuntimeError::BindingFailed {
                    kernel: kernel.to_owned(),
                    message,
                })?)
            }
            None => None,
        };

        let pass = self.pass.as_mut().ok_or(RuntimeError::EncoderClosed)?;
        pass.set_pipeline(&compiled.pipeline);
        if let Some(bind_group) = &bind_group {
            pass.set_bind_group(0, bind_group, &[]);
        }
        pass.dispatch_workgroups(counts[0], counts[1], counts[2]);
        self.calls += 1;

        log::trace!(
            "batch {} call {} '{kernel}': {} args, {} workgroups {:?}",
            self.id,
            self.calls,
            supplied,
            self.grid,
            counts
        );
        Ok(())
    }

    fn submit(&mut self) -> ComputeResult<()> {
        let _g = profiler::span("Batch::dispatch").arg("batch", Arg::U64(self.id));

        if self.state != BatchState::Recording {
            return Err(RuntimeError::EncoderClosed.into());
        }
        self.pass.take();
        let mut encoder = self.encoder.take().ok_or(RuntimeError::EncoderClosed)?;
        self.state = BatchState::Submitted;

        let shared = Arc::clone(&self.shared);
        let context = &shared.context;
        let descriptors = &mut self.descriptors;
        let order = &self.order;

        let submitted = context.scoped(|_| {
            for id in order {
                let Some(descriptor) = descriptors.get_mut(id) else { continue };
                if !descriptor.argument.kind().needs_transfer(context.shared_is_mappable) {
                    continue;
                }
                let size = descriptor.buffer.size();
                let staging = create_readback(context, *id, size);
                encoder.copy_buffer_to_buffer(&descriptor.buffer, 0, &staging, 0, size);
                descriptor.readback = Some(staging);
            }
            context.queue.submit(Some(encoder.finish()))
        });

        let index = submitted.map_err(|message| RuntimeError::SubmissionFailed { message })?;
        self.submission = Some(index);

        log::debug!(
            "batch {} submitted: {} calls, {} buffers",
            self.id,
            self.calls,
            self.descriptors.len()
        );
        Ok(())
    }

    fn wait(&self) -> ComputeResult<()> {
        let _g = profiler::span("Gate::wait").arg("batch", Arg::U64(self.id));

        let context = &self.shared.context;
        context.wait_for(self.submission.clone())?;

        let sources: Vec<(&BufferDescriptor<'a>, &wgpu::Buffer)> = self
            .order
            .iter()
            .filter_map(|id| self.descriptors.get(id))
            .filter_map(|d| d.copy_back_source(context.shared_is_mappable).map(|s| (d, s)))
            .collect();

        if sources.is_empty() {
            log::debug!("batch {} complete", self.id);
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        for (index, (_, source)) in sources.iter().enumerate() {
            let tx = tx.clone();
            source.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        context.wait_for(None)?;

        let mut results: Vec<Option<Result<(), wgpu::BufferAsyncError>>> =
            (0..sources.len()).map(|_| None).collect();
        for (index, result) in rx.try_iter() {
            results[index] = Some(result);
        }

        let mut first_error: Option<RuntimeError> = None;
        for ((descriptor, source), result) in sources.iter().zip(results) {
            let id = descriptor.argument.id();
            match result {
                Some(Ok(())) => {
                    {
                        let view = source.slice(..).get_mapped_range();
                        descriptor.argument.write_back(&view[..]);
                    }
                    source.unmap();
                }
                Some(Err(e)) => {
                    first_error.get_or_insert(RuntimeError::ReadbackFailed {
                        id,
                        message: e.to_string(),
                    });
                }
                None => {
                    first_error.get_or_insert(RuntimeError::ReadbackFailed {
                        id,
                        message: String::from("map callback was not invoked"),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                log::debug!("batch {} complete: {} buffers copied back", self.id, sources.len());
                Ok(())
            }
        }
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        self.pass.take();
        self.encoder.take();

        match self.shared.buffers() {
            Ok(mut buffers) => {
                for id in &self.order {
                    buffers.release(*id);
                }
            }
            Err(e) => log::warn!("batch {} could not release buffers: {e}", self.id),
        }

        log::debug!("batch {} released {} buffers", self.id, self.order.len());
    }
}

impl fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("grid", &self.grid)
            .field("calls", &self.calls)
            .field("buffers", &self.descriptors.len())
            .finish()
    }
}

/// Batch between calls: choose a grid for the next call, or submit.
#[derive(Debug)]
pub struct BatchBuilder<'a> {
    batch: Batch<'a>,
}

impl<'a> BatchBuilder<'a> {
    pub(crate) fn new(batch: Batch<'a>) -> Self {
        Self { batch }
    }

    /// Sets the dispatch geometry for the next call.
    ///
    /// `rows`/`cols` are total threads; the device sees `{cols, rows, 1}` and
    /// a workgroup of `{workgroup_cols, workgroup_rows, 1}`. The workgroup
    /// must equal the kernel's `@workgroup_size`, or the next call fails with
    /// `Runtime(WorkgroupMismatch)`.
    pub fn with_grid(
        self,
        rows: u32,
        cols: u32,
        workgroup_rows: u32,
        workgroup_cols: u32,
    ) -> CallBuilder<'a> {
        self.with_shape(GridShape::new(rows, cols, workgroup_rows, workgroup_cols))
    }

    /// Sets the dispatch geometry from a prepared [`GridShape`].
    pub fn with_shape(mut self, grid: GridShape) -> CallBuilder<'a> {
        self.batch.grid = grid;
        CallBuilder { batch: self.batch }
    }

    /// Submits every recorded call.
    ///
    /// ## Errors
    /// `Runtime(SubmissionFailed)` if the command stream fails validation.
    /// The batch is dropped and its buffers released.
    pub fn dispatch(mut self) -> ComputeResult<Gate<'a>> {
        self.batch.submit()?;
        Ok(Gate { batch: self.batch })
    }

    /// The underlying batch.
    #[inline]
    pub fn batch(&self) -> &Batch<'a> {
        &self.batch
    }
}

/// Batch with a grid set: record exactly one call.
#[derive(Debug)]
pub struct CallBuilder<'a> {
    batch: Batch<'a>,
}

impl<'a> CallBuilder<'a> {
    /// Records a dispatch of `kernel` with positional `args`.
    ///
    /// `args` is a tuple (or array/`Vec`) of wrapped arguments; bare
    /// references are bound as `In`. Argument `i` is bound to
    /// `@group(0) @binding(i)`.
    ///
    /// ## Errors
    /// * `FunctionNotFound` if no library exports `kernel`, or its pipeline
    ///   could not be built.
    /// * `Runtime` for a zero workgroup dimension, a workgroup that differs
    ///   from the kernel's `@workgroup_size`, too few arguments, a failed
    ///   allocation or a rejected bind group.
    ///
    /// The builder is returned inside the error with all previously recorded
    /// calls intact.
    pub fn call<A: KernelArgs<'a>>(
        mut self,
        kernel: &str,
        args: A,
    ) -> Result<BatchBuilder<'a>, CallError<'a>> {
        match self.batch.call(kernel, args.into_arguments()) {
            Ok(()) => Ok(BatchBuilder { batch: self.batch }),
            Err(error) => {
                log::debug!("batch {}: call '{kernel}' failed: {error}", self.batch.id);
                Err(CallError { error, builder: BatchBuilder { batch: self.batch } })
            }
        }
    }

    /// The underlying batch.
    #[inline]
    pub fn batch(&self) -> &Batch<'a> {
        &self.batch
    }
}

/// A failed [`CallBuilder::call`], carrying the batch back to the caller.
///
/// Converts into [`ComputeError`] with `?`, which drops the batch.
pub struct CallError<'a> {
    error: ComputeError,
    builder: BatchBuilder<'a>,
}

impl<'a> CallError<'a> {
    /// The error raised by the call.
    #[inline]
    pub fn error(&self) -> &ComputeError {
        &self.error
    }

    /// Recovers the batch; calls recorded before the failure are kept.
    pub fn into_builder(self) -> BatchBuilder<'a> {
        self.builder
    }

    /// Splits into the error and the recovered batch.
    pub fn into_parts(self) -> (ComputeError, BatchBuilder<'a>) {
        (self.error, self.builder)
    }
}

impl fmt::Debug for CallError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallError")
            .field("error", &self.error)
            .field("batch", &self.builder.batch.id)
            .finish()
    }
}

impl fmt::Display for CallError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for CallError<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<CallError<'_>> for ComputeError {
    fn from(e: CallError<'_>) -> Self {
        e.error
    }
}

/// Handle to a submitted batch.
///
/// Holds the batch, and therefore every device buffer it references, until
/// dropped.
#[derive(Debug)]
pub struct Gate<'a> {
    batch: Batch<'a>,
}

impl<'a> Gate<'a> {
    /// Blocks until the device has finished the batch, then copies `Out`,
    /// `InOut` and `Shared` arguments back into host memory.
    ///
    /// Repeatable: later calls return immediately after copying again.
    ///
    /// ## Errors
    /// `Runtime(WaitFailed)` on device loss, `Runtime(ReadbackFailed)` if a
    /// buffer could not be mapped.
    pub fn wait(&self) -> ComputeResult<()> {
        self.batch.wait()
    }

    /// The underlying batch.
    #[inline]
    pub fn batch(&self) -> &Batch<'a> {
        &self.batch
    }
}
