//! Core Types, Identifiers, and Dispatch Geometry
//!
//! This module defines the small, copyable vocabulary shared by the argument
//! model, the device caches and the batch protocol.
//!
//! ## Buffer kinds
//!
//! Every kernel argument is classified into one of five [`BufferKind`]s. The
//! kind is the *only* input that decides:
//!
//! - which storage mode the device buffer is allocated with,
//! - whether host bytes are copied in at allocation time,
//! - whether a transfer is recorded at submission,
//! - whether bytes are copied back into host memory on wait.
//!
//! | kind      | host bytes in | transfer on submit   | copy-back on wait |
//! |-----------|---------------|----------------------|-------------------|
//! | `In`      | yes           | no                   | no                |
//! | `InOut`   | yes           | yes                  | yes               |
//! | `Out`     | yes           | yes                  | yes               |
//! | `Shared`  | yes           | only if not mappable | yes               |
//! | `Private` | no            | no                   | no                |
//!
//! ## Identifiers
//!
//! [`ArgumentId`] values are drawn from a process-wide monotonically increasing
//! counter and never reused within a process.
//!
//! ## Geometry
//!
//! [`GridShape`] stores the caller's row/column naming. The device receives
//! x-first extents: `{cols, rows, 1}` for the grid and
//! `{workgroup_cols, workgroup_rows, 1}` for the workgroup.

use std::fmt;

/// Identifier of one wrapped kernel argument.
///
/// Copies of an argument share its id; every wrapping call allocates a new one.
pub type ArgumentId = u64;

/// Identifier of one batch, used for logging and profiling only.
pub type BatchID = u64;

/// Positional kernel argument slot (`@group(0) @binding(slot)` in WGSL).
pub type SlotIndex = u32;

/// Memory-visibility classification of a kernel argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Read by the kernel; host memory is never updated.
    In,
    /// Written by the kernel; copied back to host memory on wait.
    Out,
    /// Read and written by the kernel; copied back to host memory on wait.
    InOut,
    /// Device-only scratch storage with no host mirror.
    Private,
    /// Storage visible to both host and device; copied back on wait.
    Shared,
}

/// Device storage mode selected for a [`BufferKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// Device storage initialised from host bytes and synchronised explicitly.
    Managed,
    /// Device-only storage.
    Private,
    /// Storage mapped directly by the host.
    Shared,
}

impl BufferKind {
    /// All kinds, in declaration order.
    pub const ALL: [BufferKind; 5] = [
        BufferKind::In,
        BufferKind::Out,
        BufferKind::InOut,
        BufferKind::Private,
        BufferKind::Shared,
    ];

    /// Storage mode requested for this kind.
    #[inline]
    pub fn storage_mode(self) -> StorageMode {
        match self {
            BufferKind::In | BufferKind::Out | BufferKind::InOut => StorageMode::Managed,
            BufferKind::Private => StorageMode::Private,
            BufferKind::Shared => StorageMode::Shared,
        }
    }

    /// Whether arguments of this kind carry a host address.
    #[inline]
    pub fn has_host_mirror(self) -> bool {
        !matches!(self, BufferKind::Private)
    }

    /// Whether host bytes are written back after the batch completes.
    #[inline]
    pub fn copies_back(self) -> bool {
        matches!(self, BufferKind::Out | BufferKind::InOut | BufferKind::Shared)
    }

    /// Whether a device-to-host transfer must be recorded at submission.
    ///
    /// `shared_is_mappable` reports whether the device can map shared storage
    /// directly; when it cannot, shared buffers fall back to a transfer.
    #[inline]
    pub fn needs_transfer(self, shared_is_mappable: bool) -> bool {
        match self {
            BufferKind::Out | BufferKind::InOut => true,
            BufferKind::Shared => !shared_is_mappable,
            BufferKind::In | BufferKind::Private => false,
        }
    }

    /// Whether the kernel is expected to write to buffers of this kind.
    #[inline]
    pub fn is_writable(self) -> bool {
        !matches!(self, BufferKind::In)
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferKind::In => "in",
            BufferKind::Out => "out",
            BufferKind::InOut => "inout",
            BufferKind::Private => "private",
            BufferKind::Shared => "shared",
        };
        f.write_str(name)
    }
}

/// Dispatch geometry for one kernel call.
///
/// Rows map to the device `y` axis and columns to `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridShape {
    /// Total threads along `y`.
    pub rows: u32,
    /// Total threads along `x`.
    pub cols: u32,
    /// Threads per workgroup along `y`.
    pub workgroup_rows: u32,
    /// Threads per workgroup along `x`.
    pub workgroup_cols: u32,
}

impl GridShape {
    /// Creates a grid from the caller's row/column naming.
    pub fn new(rows: u32, cols: u32, workgroup_rows: u32, workgroup_cols: u32) -> Self {
        Self { rows, cols, workgroup_rows, workgroup_cols }
    }

    /// Grid extent in device order.
    #[inline]
    pub fn grid_extent(&self) -> [u32; 3] {
        [self.cols, self.rows, 1]
    }

    /// Workgroup extent in device order.
    #[inline]
    pub fn workgroup_extent(&self) -> [u32; 3] {
        [self.workgroup_cols, self.workgroup_rows, 1]
    }

    /// Number of workgroups to dispatch in device order.
    ///
    /// Partial workgroups are rounded up; kernels bounds-check the tail.
    /// Returns `None` when a workgroup dimension is zero.
    pub fn workgroup_counts(&self) -> Option<[u32; 3]> {
        if self.workgroup_rows == 0 || self.workgroup_cols == 0 {
            return None;
        }
        Some([
            self.cols.div_ceil(self.workgroup_cols),
            self.rows.div_ceil(self.workgroup_rows),
            1,
        ])
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid {}x{} (workgroup {}x{})",
            self.rows, self.cols, self.workgroup_rows, self.workgroup_cols
        )
    }
}
