//! # GPU Device Context
//!
//! Owns the `wgpu` device and queue used by one engine, plus the adapter
//! facts the rest of the backend needs (adapter info, whether shared storage
//! can be mapped directly).
//!
//! ## Error capture
//!
//! `wgpu` reports validation failures asynchronously through an uncaptured
//! error handler. Every device operation that can fail validation is wrapped
//! in [`GPUContext::scoped`], which pushes a validation error scope, runs the
//! operation and pops the scope synchronously, returning the backend message
//! as `Err(String)`.

use crate::engine::config::EngineConfig;
use crate::engine::error::RuntimeError;

/// Device, queue and adapter capabilities for one engine.
#[derive(Debug)]
pub struct GPUContext {
    /// Logical device.
    pub device: wgpu::Device,

    /// Submission queue of `device`.
    pub queue: wgpu::Queue,

    /// Adapter the device was created from.
    pub adapter_info: wgpu::AdapterInfo,

    /// Whether `MAP_READ` may be combined with `STORAGE` on this device.
    pub shared_is_mappable: bool,
}

impl GPUContext {
    /// Acquires an adapter and device according to `config`.
    ///
    /// ## Errors
    /// `DeviceRequestFailed` if no adapter matches or the device request fails.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            force_fallback_adapter: config.force_fallback_adapter,
            compatible_surface: None,
        }))
        .map_err(|e| RuntimeError::DeviceRequestFailed { message: e.to_string() })?;

        let adapter_info = adapter.get_info();
        let shared_is_mappable = adapter
            .features()
            .contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS);

        let required_features = if shared_is_mappable {
            wgpu::Features::MAPPABLE_PRIMARY_BUFFERS
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(config.label.as_str()),
            required_features,
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| RuntimeError::DeviceRequestFailed { message: e.to_string() })?;

        log::info!(
            "gpu device ready: adapter '{}' ({:?}, {:?}), mappable shared storage: {}",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type,
            shared_is_mappable
        );

        Ok(Self { device, queue, adapter_info, shared_is_mappable })
    }

    /// Runs `op` inside a validation error scope.
    ///
    /// Returns the value produced by `op`, or the backend's validation
    /// message if the scope captured an error.
    pub fn scoped<T>(&self, op: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = op(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => Err(e.to_string()),
        }
    }

    /// Blocks until `submission` has completed on the device.
    pub fn wait_for(&self, submission: Option<wgpu::SubmissionIndex>) -> Result<(), RuntimeError> {
        self.device
            .poll(wgpu::PollType::Wait { submission_index: submission, timeout: None })
            .map(|_| ())
            .map_err(|e| RuntimeError::WaitFailed { message: e.to_string() })
    }
}
