/// Chrome Trace (flame-style) span profiler.
///
/// Feature-gated and zero-cost when disabled. When the `profiling` feature is
/// on, spans are recorded and written as a **Chrome Trace Event JSON** file
/// that can be opened in:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// ## Feature flag
///
/// ```bash
/// cargo bench --features profiling
/// ```
///
/// ## Usage
///
/// ```no_run
/// use batch_compute::profiler;
///
/// profiler::init("profile/trace.json");
///
/// {
///     let _g = profiler::span("simulation_step");
///     // open batches, call kernels, wait
/// }
///
/// profiler::shutdown();
/// ```
///
/// The engine records spans named `ComputeEngine::init`,
/// `ComputeEngine::load_library`, `Batch::call`, `Batch::dispatch` and
/// `Gate::wait`; batch spans carry the batch id as an argument.

pub mod profiler;
