//! # Kernel Argument Model
//!
//! This module turns arbitrary host values into [`ArgumentBuffer`]s: the
//! `{id, host address, size, kind}` records that a batch resolves into device
//! buffers and binds to positional kernel slots.
//!
//! ## Wrapping functions
//!
//! | function       | kind      | borrows        |
//! |----------------|-----------|----------------|
//! | [`input`]      | `In`      | `&'a T`        |
//! | [`inout`]      | `InOut`   | `&'a mut T`    |
//! | [`output`]     | `Out`     | `&'a mut T`    |
//! | [`shared`]     | `Shared`  | `&'a mut T`    |
//! | [`private`]    | `Private` | nothing (size) |
//!
//! A bare reference passed to [`call`](crate::CallBuilder::call) converts into
//! an `In` argument through `From<&T>`.
//!
//! ## Size and address inference
//!
//! Inference is delegated to [`HostData`]:
//!
//! * scalars and `Pod` structs: their own storage size and address,
//! * `[T; N]`, `[T]`, `Vec<T>`: `len * size_of::<T>()`, address of the first
//!   element,
//! * `&T`, `&mut T`, `Box<T>`: recurse to the pointee.
//!
//! [`ArgumentBuffer::with_size`] narrows the inferred size;
//! [`ArgumentBuffer::try_with_size`] reports an oversized request as an error.
//!
//! ## Identity
//!
//! Each wrapping call allocates a fresh [`ArgumentId`] from a process-wide
//! counter. `ArgumentBuffer` is neither `Copy` nor `Clone`: passing it by
//! value moves it into a call. Passing `&arg` instead rebinds the same id, so
//! binding one argument to several calls of one batch resolves to one device
//! buffer.
//!
//! ```
//! # use batch_compute::{inout, private, KernelArgs};
//! let mut data = [0u32; 4];
//! let arg = inout(&mut data);
//! let scratch = private(16);
//!
//! let first = (&arg, &scratch).into_arguments();
//! let second = (&arg, &scratch).into_arguments();
//! assert_eq!(first[0].id(), second[0].id());
//! assert_eq!(first[1].id(), second[1].id());
//! ```
//!
//! ## Lifetimes and threads
//!
//! The `'a` parameter ties an argument to the host value it was built from.
//! Batches, builders and the [`Gate`](crate::Gate) carry the same `'a`, so the
//! host memory is guaranteed to outlive copy-back.
//!
//! Arguments are neither `Send` nor `Sync`, and neither is any batch holding
//! them. Every write-back through one host region therefore happens on the
//! thread that borrowed it. A writable argument cannot be moved into two
//! batches:
//!
//! ```compile_fail
//! # use batch_compute::{inout, ComputeEngine};
//! # fn run(engine: &ComputeEngine) -> batch_compute::ComputeResult<()> {
//! let mut data = [0u32; 4];
//! let arg = inout(&mut data);
//! let first = engine.new_batch()?.with_grid(1, 4, 1, 4).call("k", (arg,))?;
//! let second = engine.new_batch()?.with_grid(1, 4, 1, 4).call("k", (arg,))?;
//! # Ok(())
//! # }
//! ```
//!
//! nor can a batch be handed to another thread:
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<batch_compute::Gate<'static>>();
//! ```

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;

use crate::engine::error::RuntimeError;
use crate::engine::types::{ArgumentId, BufferKind};

static NEXT_ARGUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_argument_id() -> ArgumentId {
    NEXT_ARGUMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Host values that can be read as a contiguous byte region.
pub trait HostData {
    /// The value's bytes, starting at the address bound to the kernel.
    fn as_host_bytes(&self) -> &[u8];
}

/// Host values that can also be written back after a batch completes.
pub trait HostDataMut: HostData {
    /// Mutable view of the same region as [`HostData::as_host_bytes`].
    fn as_host_bytes_mut(&mut self) -> &mut [u8];
}

/// Implements [`HostData`] and [`HostDataMut`] for `bytemuck::Pod` types.
///
/// ```
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Params { scale: f32, offset: f32 }
///
/// batch_compute::impl_host_data!(Params);
///
/// let params = Params { scale: 2.0, offset: 1.0 };
/// let arg = batch_compute::input(&params);
/// assert_eq!(arg.size(), 8);
/// ```
#[macro_export]
macro_rules! impl_host_data {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::HostData for $ty {
            #[inline]
            fn as_host_bytes(&self) -> &[u8] {
                $crate::bytemuck::bytes_of(self)
            }
        }

        impl $crate::HostDataMut for $ty {
            #[inline]
            fn as_host_bytes_mut(&mut self) -> &mut [u8] {
                $crate::bytemuck::bytes_of_mut(self)
            }
        }
    )+};
}

impl_host_data!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<T: Pod, const N: usize> HostData for [T; N] {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl<T: Pod, const N: usize> HostDataMut for [T; N] {
    #[inline]
    fn as_host_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }
}

impl<T: Pod> HostData for [T] {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self)
    }
}

impl<T: Pod> HostDataMut for [T] {
    #[inline]
    fn as_host_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self)
    }
}

impl<T: Pod> HostData for Vec<T> {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl<T: Pod> HostDataMut for Vec<T> {
    #[inline]
    fn as_host_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }
}

impl<T: HostData + ?Sized> HostData for &T {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        (**self).as_host_bytes()
    }
}

impl<T: HostData + ?Sized> HostData for &mut T {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        (**self).as_host_bytes()
    }
}

impl<T: HostDataMut + ?Sized> HostDataMut for &mut T {
    #[inline]
    fn as_host_bytes_mut(&mut self) -> &mut [u8] {
        (**self).as_host_bytes_mut()
    }
}

impl<T: HostData + ?Sized> HostData for Box<T> {
    #[inline]
    fn as_host_bytes(&self) -> &[u8] {
        (**self).as_host_bytes()
    }
}

impl<T: HostDataMut + ?Sized> HostDataMut for Box<T> {
    #[inline]
    fn as_host_bytes_mut(&mut self) -> &mut [u8] {
        (**self).as_host_bytes_mut()
    }
}

/// Raw host region captured at wrapping time.
#[derive(Clone, Copy, Debug)]
struct HostPtr(NonNull<u8>);

/// One kernel argument: a host region (or none) classified by [`BufferKind`].
#[derive(Debug)]
pub struct ArgumentBuffer<'a> {
    id: ArgumentId,
    host: Option<HostPtr>,
    size: usize,
    capacity: usize,
    kind: BufferKind,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> ArgumentBuffer<'a> {
    fn from_region(kind: BufferKind, region: NonNull<[u8]>) -> Self {
        let len = region.len();
        Self {
            id: next_argument_id(),
            host: Some(HostPtr(region.cast())),
            size: len,
            capacity: len,
            kind,
            _borrow: PhantomData,
        }
    }

    /// Wraps a raw host region.
    ///
    /// For `Private`, `ptr` is ignored and may be null.
    ///
    /// # Safety
    /// For every other kind, `ptr` must be valid for reads of `size` bytes for
    /// `'a`; for `Out`, `InOut` and `Shared` it must also be valid for writes
    /// and not aliased by any other live reference until the batch's
    /// [`Gate`](crate::Gate) is dropped.
    pub unsafe fn from_raw_parts(kind: BufferKind, ptr: *mut u8, size: usize) -> Self {
        let host = if kind.has_host_mirror() { NonNull::new(ptr).map(HostPtr) } else { None };
        Self {
            id: next_argument_id(),
            host,
            size,
            capacity: if host.is_some() { size } else { 0 },
            kind,
            _borrow: PhantomData,
        }
    }

    /// Narrows the number of bytes transferred for this argument.
    ///
    /// The id is kept. For `Private` arguments this sets the allocation size.
    ///
    /// # Panics
    /// Panics if `size` exceeds the borrowed host region. See
    /// [`try_with_size`](Self::try_with_size) for the fallible form.
    #[must_use]
    pub fn with_size(self, size: usize) -> Self {
        match self.try_with_size(size) {
            Ok(narrowed) => narrowed,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible [`with_size`](Self::with_size).
    ///
    /// ## Errors
    /// `ArgumentTooLarge` if `size` exceeds the borrowed host region; the
    /// argument is dropped.
    pub fn try_with_size(mut self, size: usize) -> Result<Self, RuntimeError> {
        if self.host.is_some() && size > self.capacity {
            return Err(RuntimeError::ArgumentTooLarge {
                id: self.id,
                size,
                capacity: self.capacity,
            });
        }
        self.size = size;
        Ok(self)
    }

    /// Same argument under a shorter borrow; the id is shared.
    fn rebind(&self) -> ArgumentBuffer<'_> {
        ArgumentBuffer {
            id: self.id,
            host: self.host,
            size: self.size,
            capacity: self.capacity,
            kind: self.kind,
            _borrow: PhantomData,
        }
    }

    /// Process-unique id, shared by every rebinding of this argument.
    #[inline]
    pub fn id(&self) -> ArgumentId {
        self.id
    }

    /// Number of bytes transferred to and from the device.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Argument classification.
    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Host address bound at wrapping time; null for `Private`.
    #[inline]
    pub fn host_address(&self) -> *const u8 {
        self.host.map_or(std::ptr::null(), |p| p.0.as_ptr().cast_const())
    }

    /// Host bytes copied into the device buffer at allocation time.
    pub(crate) fn host_bytes(&self) -> Option<&[u8]> {
        // SAFETY: `host` came from a borrow valid for `'a` covering at least
        // `capacity >= size` bytes; `self` cannot outlive `'a`.
        self.host
            .map(|p| unsafe { std::slice::from_raw_parts(p.0.as_ptr().cast_const(), self.size) })
    }

    /// Copies device contents back into host memory.
    ///
    /// Only kinds that copy back are written; at most `size` bytes are copied.
    pub(crate) fn write_back(&self, bytes: &[u8]) {
        if !self.kind.copies_back() {
            return;
        }
        if let Some(p) = self.host {
            let len = self.size.min(bytes.len());
            // SAFETY: copy-back kinds are only constructed from `&'a mut`
            // borrows (or `from_raw_parts` under the same contract), and the
            // batch holding `self` cannot outlive `'a`. Arguments are `!Send`
            // and `!Sync`, so every write through this region happens on the
            // borrowing thread.
            unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), p.0.as_ptr(), len) };
        }
    }
}

impl<'a, T: HostData + ?Sized> From<&'a T> for ArgumentBuffer<'a> {
    /// Bare arguments are bound as `In`.
    #[inline]
    fn from(value: &'a T) -> Self {
        input(value)
    }
}

impl<'b, 'a: 'b> From<&'b ArgumentBuffer<'a>> for ArgumentBuffer<'b> {
    /// Binds the same argument again; no new id is allocated.
    #[inline]
    fn from(argument: &'b ArgumentBuffer<'a>) -> Self {
        argument.rebind()
    }
}

/// Wraps a value read by the kernel. Host memory is never written.
pub fn input<T: HostData + ?Sized>(value: &T) -> ArgumentBuffer<'_> {
    ArgumentBuffer::from_region(BufferKind::In, NonNull::from(value.as_host_bytes()))
}

/// Wraps a value read and written by the kernel; copied back on wait.
pub fn inout<T: HostDataMut + ?Sized>(value: &mut T) -> ArgumentBuffer<'_> {
    ArgumentBuffer::from_region(BufferKind::InOut, NonNull::from(value.as_host_bytes_mut()))
}

/// Wraps a value written by the kernel; copied back on wait.
pub fn output<T: HostDataMut + ?Sized>(value: &mut T) -> ArgumentBuffer<'_> {
    ArgumentBuffer::from_region(BufferKind::Out, NonNull::from(value.as_host_bytes_mut()))
}

/// Wraps a value in host/device shared storage; copied back on wait.
pub fn shared<T: HostDataMut + ?Sized>(value: &mut T) -> ArgumentBuffer<'_> {
    ArgumentBuffer::from_region(BufferKind::Shared, NonNull::from(value.as_host_bytes_mut()))
}

/// Creates device-only scratch storage of `size` bytes.
pub fn private(size: usize) -> ArgumentBuffer<'static> {
    ArgumentBuffer {
        id: next_argument_id(),
        host: None,
        size,
        capacity: 0,
        kind: BufferKind::Private,
        _borrow: PhantomData,
    }
}

/// A positional argument list for one kernel call.
///
/// Implemented for tuples of anything convertible into [`ArgumentBuffer`]
/// (wrapped arguments, `&ArgumentBuffer` rebindings or bare references), and
/// for arrays, vectors and slices of `ArgumentBuffer`.
pub trait KernelArgs<'a> {
    /// Arguments in slot order.
    fn into_arguments(self) -> Vec<ArgumentBuffer<'a>>;
}

impl<'a> KernelArgs<'a> for ArgumentBuffer<'a> {
    fn into_arguments(self) -> Vec<ArgumentBuffer<'a>> {
        vec![self]
    }
}

impl<'b, 'a: 'b> KernelArgs<'b> for &'b ArgumentBuffer<'a> {
    fn into_arguments(self) -> Vec<ArgumentBuffer<'b>> {
        vec![self.rebind()]
    }
}

impl<'a> KernelArgs<'a> for Vec<ArgumentBuffer<'a>> {
    fn into_arguments(self) -> Vec<ArgumentBuffer<'a>> {
        self
    }
}

impl<'a, const N: usize> KernelArgs<'a> for [ArgumentBuffer<'a>; N] {
    fn into_arguments(self) -> Vec<ArgumentBuffer<'a>> {
        self.into_iter().collect()
    }
}

impl<'b, 'a: 'b> KernelArgs<'b> for &'b [ArgumentBuffer<'a>] {
    fn into_arguments(self) -> Vec<ArgumentBuffer<'b>> {
        self.iter().map(ArgumentBuffer::rebind).collect()
    }
}

macro_rules! tuple_kernel_args {
    ($($name:ident),*) => {
        impl<'a, $($name: Into<ArgumentBuffer<'a>>),*> KernelArgs<'a> for ($($name,)*) {
            #[allow(non_snake_case)]
            fn into_arguments(self) -> Vec<ArgumentBuffer<'a>> {
                let ($($name,)*) = self;
                vec![$($name.into()),*]
            }
        }
    };
}

tuple_kernel_args!();
tuple_kernel_args!(A);
tuple_kernel_args!(A, B);
tuple_kernel_args!(A, B, C);
tuple_kernel_args!(A, B, C, D);
tuple_kernel_args!(A, B, C, D, E);
tuple_kernel_args!(A, B, C, D, E, F);
tuple_kernel_args!(A, B, C, D, E, F, G);
tuple_kernel_args!(A, B, C, D, E, F, G, H);
tuple_kernel_args!(A, B, C, D, E, F, G, H, I);
tuple_kernel_args!(A, B, C, D, E, F, G, H, I, J);
tuple_kernel_args!(A, B, C, D, E, F, G, H, I, J, K);
tuple_kernel_args!(A, B, C, D, E, F, G, H, I, J, K, L);
