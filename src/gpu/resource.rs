//! # Device Buffer Cache
//!
//! Live device buffers keyed by [`ArgumentId`]. Buffers are created lazily the
//! first time a batch registers an argument and are evicted when that batch is
//! dropped.
//!
//! ## Allocation
//!
//! * Sizes are rounded up to a multiple of 4 bytes, minimum 4.
//! * Kinds with a host mirror are created mapped and filled with the host
//!   bytes; `Private` buffers start zeroed.
//! * Usage flags follow [`BufferKind::storage_mode`]; `Shared` buffers are
//!   host-mappable only when the device supports it.

use std::collections::HashMap;

use crate::engine::args::ArgumentBuffer;
use crate::engine::error::RuntimeError;
use crate::engine::types::{ArgumentId, BufferKind, StorageMode};
use crate::gpu::context::GPUContext;

/// Copy alignment required by the backend.
pub const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Device allocation size for `size` host bytes.
#[inline]
pub fn padded_size(size: usize) -> u64 {
    (size as u64).max(1).next_multiple_of(COPY_ALIGNMENT)
}

/// Usage flags for a buffer of `kind`.
pub fn buffer_usages(kind: BufferKind, shared_is_mappable: bool) -> wgpu::BufferUsages {
    use wgpu::BufferUsages as U;

    let base = U::STORAGE | U::COPY_SRC | U::COPY_DST;
    match kind.storage_mode() {
        StorageMode::Managed if !kind.is_writable() => base | U::UNIFORM,
        StorageMode::Managed | StorageMode::Private => base,
        StorageMode::Shared if shared_is_mappable => base | U::MAP_READ,
        StorageMode::Shared => base,
    }
}

/// Staging buffer used to read back a buffer of `size` bytes.
pub fn create_readback(context: &GPUContext, id: ArgumentId, size: u64) -> wgpu::Buffer {
    context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("readback_{id}")),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Engine-wide table of live device buffers.
#[derive(Debug, Default)]
pub struct BufferCache {
    buffers: HashMap<ArgumentId, wgpu::Buffer>,
}

impl BufferCache {
    /// Creates an empty buffer cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer cached for `argument`, allocating it on first use.
    pub fn get_or_create(
        &mut self,
        context: &GPUContext,
        argument: &ArgumentBuffer<'_>,
    ) -> Result<wgpu::Buffer, RuntimeError> {
        let id = argument.id();
        if let Some(buffer) = self.buffers.get(&id) {
            return Ok(buffer.clone());
        }

        let kind = argument.kind();
        let size = padded_size(argument.size());
        let host = argument.host_bytes();

        let limit = context.device.limits().max_buffer_size;
        if size > limit {
            return Err(RuntimeError::AllocationFailed {
                id,
                size,
                message: format!("exceeds device max_buffer_size of {limit} bytes"),
            });
        }

        let buffer = context
            .scoped(|device| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{kind}_{id}")),
                    size,
                    usage: buffer_usages(kind, context.shared_is_mappable),
                    mapped_at_creation: host.is_some(),
                });
                if let Some(bytes) = host {
                    buffer.slice(..).get_mapped_range_mut()[..bytes.len()].copy_from_slice(bytes);
                    buffer.unmap();
                }
                buffer
            })
            .map_err(|message| RuntimeError::AllocationFailed { id, size, message })?;

        log::trace!("allocated {kind} buffer for argument {id} ({size} bytes)");
        self.buffers.insert(id, buffer.clone());
        Ok(buffer)
    }

    /// Evicts the buffer for `id`. Returns whether one was present.
    pub fn release(&mut self, id: ArgumentId) -> bool {
        let released = self.buffers.remove(&id).is_some();
        if released {
            log::trace!("released buffer for argument {id}");
        }
        released
    }

    /// Number of live buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}
