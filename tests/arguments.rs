use std::mem::size_of;

use batch_compute::{
    input, inout, output, private, shared, ArgumentBuffer, BufferKind, HostData, KernelArgs,
    RuntimeError,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Particle {
    position: [f32; 2],
    velocity: [f32; 2],
    mass: f32,
    _pad: f32,
}

batch_compute::impl_host_data!(Particle);

#[test]
fn wrapping_allocates_strictly_increasing_ids() {
    let a = 1.0f32;
    let mut b = [0u32; 4];
    let mut c = vec![0.0f64; 3];

    let first = input(&a).id();
    let second = inout(&mut b).id();
    let third = output(&mut c).id();
    let fourth = private(16).id();

    assert!(first < second);
    assert!(second < third);
    assert!(third < fourth);
}

#[test]
fn rebinding_by_reference_shares_the_id() {
    let mut values = [1u32, 2, 3];
    let arg = inout(&mut values);
    let rebound = (&arg, &arg).into_arguments();

    assert_eq!(rebound[0].id(), arg.id());
    assert_eq!(rebound[1].id(), arg.id());
    assert_eq!(rebound[0].size(), arg.size());
    assert_eq!(rebound[0].kind(), BufferKind::InOut);
    assert_eq!(rebound[0].host_address(), arg.host_address());
}

#[test]
fn wrapping_the_same_value_twice_yields_distinct_ids() {
    let values = [1u32, 2, 3];
    assert_ne!(input(&values).id(), input(&values).id());
}

#[test]
fn scalar_size_and_address() {
    let x = 42u64;
    let arg = input(&x);

    assert_eq!(arg.size(), size_of::<u64>());
    assert_eq!(arg.host_address(), &x as *const u64 as *const u8);
    assert_eq!(arg.kind(), BufferKind::In);
}

#[test]
fn fixed_array_size_and_address() {
    let mut values = [0.0f32; 10];
    let expected = values.as_ptr() as *const u8;
    let arg = inout(&mut values);

    assert_eq!(arg.size(), 10 * size_of::<f32>());
    assert_eq!(arg.host_address(), expected);
    assert_eq!(arg.kind(), BufferKind::InOut);
}

#[test]
fn vector_size_and_address_follow_the_heap_allocation() {
    let mut values = vec![0i32; 37];
    let expected = values.as_ptr() as *const u8;
    let arg = output(&mut values);

    assert_eq!(arg.size(), 37 * size_of::<i32>());
    assert_eq!(arg.host_address(), expected);
    assert_eq!(arg.kind(), BufferKind::Out);
}

#[test]
fn slices_and_boxes_recurse_to_the_pointee() {
    let data = vec![1u16, 2, 3, 4, 5, 6];
    let slice: &[u16] = &data[2..];
    let arg = input(slice);
    assert_eq!(arg.size(), 4 * size_of::<u16>());
    assert_eq!(arg.host_address(), data[2..].as_ptr() as *const u8);

    let boxed: Box<[f32; 8]> = Box::new([0.0; 8]);
    let arg = input(&boxed);
    assert_eq!(arg.size(), 8 * size_of::<f32>());
    assert_eq!(arg.host_address(), boxed.as_ptr() as *const u8);
}

#[test]
fn pointer_to_container_recurses_to_the_container() {
    let data = vec![0u8; 12];
    let reference = &data;
    let arg = input(&reference);

    assert_eq!(arg.size(), 12);
    assert_eq!(arg.host_address(), data.as_ptr());
}

#[test]
fn shared_wraps_mutable_host_memory() {
    let mut values = [7u32; 5];
    let arg = shared(&mut values);

    assert_eq!(arg.kind(), BufferKind::Shared);
    assert_eq!(arg.size(), 20);
}

#[test]
fn private_has_no_host_address() {
    let arg = private(256);
    let id = arg.id();

    assert_eq!(arg.kind(), BufferKind::Private);
    assert_eq!(arg.size(), 256);
    assert!(arg.host_address().is_null());

    let resized = arg.with_size(1024);
    assert_eq!(resized.size(), 1024);
    assert_eq!(resized.id(), id);
}

#[test]
fn with_size_narrows_the_transfer_and_keeps_the_id() {
    let values = [0u32; 16];
    let arg = input(&values);
    let (id, address) = (arg.id(), arg.host_address());
    let narrowed = arg.with_size(8);

    assert_eq!(narrowed.size(), 8);
    assert_eq!(narrowed.id(), id);
    assert_eq!(narrowed.host_address(), address);
}

#[test]
#[should_panic(expected = "exceeds borrowed host region")]
fn with_size_cannot_grow_past_the_borrow() {
    let values = [0u32; 4];
    let _ = input(&values).with_size(17);
}

#[test]
fn oversized_requests_are_errors_when_fallible() {
    let values = [0u32; 4];
    let arg = input(&values);
    let id = arg.id();

    assert_eq!(
        arg.try_with_size(17).unwrap_err(),
        RuntimeError::ArgumentTooLarge { id, size: 17, capacity: 16 }
    );

    let narrowed = input(&values).try_with_size(12).expect("within the borrow");
    assert_eq!(narrowed.size(), 12);

    let grown = private(4).try_with_size(4096).expect("private sizes are unbounded");
    assert_eq!(grown.size(), 4096);
}

#[test]
fn pod_structs_via_macro() {
    let particles = vec![
        Particle { position: [0.0, 1.0], velocity: [1.0, 0.0], mass: 2.0, _pad: 0.0 };
        3
    ];
    assert_eq!(particles[0].as_host_bytes().len(), size_of::<Particle>());

    let arg = input(&particles);
    assert_eq!(arg.size(), 3 * size_of::<Particle>());
}

#[test]
fn raw_parts_respect_kind() {
    let mut values = [1.0f32; 4];
    let ptr = values.as_mut_ptr() as *mut u8;

    let arg = unsafe { ArgumentBuffer::from_raw_parts(BufferKind::InOut, ptr, 16) };
    assert_eq!(arg.kind(), BufferKind::InOut);
    assert_eq!(arg.host_address(), ptr as *const u8);

    let scratch = unsafe { ArgumentBuffer::from_raw_parts(BufferKind::Private, ptr, 64) };
    assert!(scratch.host_address().is_null());
    assert_eq!(scratch.size(), 64);
}

#[test]
fn bare_references_default_to_in() {
    let values = vec![1.0f32; 4];
    let arg: ArgumentBuffer<'_> = (&values).into();

    assert_eq!(arg.kind(), BufferKind::In);
    assert_eq!(arg.size(), 16);
}

#[test]
fn tuples_preserve_positional_order() {
    let a = [1u32; 2];
    let mut b = [0u32; 3];
    let scale = 0.5f32;

    let args = (&a, inout(&mut b), private(64), &scale).into_arguments();
    let kinds: Vec<BufferKind> = args.iter().map(|arg| arg.kind()).collect();

    assert_eq!(
        kinds,
        vec![BufferKind::In, BufferKind::InOut, BufferKind::Private, BufferKind::In]
    );
    assert_eq!(args[0].size(), 8);
    assert_eq!(args[1].size(), 12);
    assert_eq!(args[2].size(), 64);
    assert_eq!(args[3].size(), 4);
    assert!(args.windows(2).all(|w| w[0].id() < w[1].id()));
}

#[test]
fn empty_and_collection_argument_lists() {
    assert!(().into_arguments().is_empty());

    let a = [0u8; 4];
    let b = [0u8; 8];
    let list = vec![input(&a), input(&b)];
    let ids: Vec<u64> = list.iter().map(|arg| arg.id()).collect();

    let rebound = list.as_slice().into_arguments();
    assert_eq!(rebound[1].size(), 8);
    assert_eq!(rebound.iter().map(|arg| arg.id()).collect::<Vec<_>>(), ids);
    drop(rebound);

    assert_eq!(list.into_arguments().len(), 2);
    assert_eq!([input(&a), input(&b), private(4)].into_arguments().len(), 3);
}

#[test]
fn twelve_argument_tuples_are_supported() {
    let v = [0u32; 1];
    let args = (&v, &v, &v, &v, &v, &v, &v, &v, &v, &v, &v, &v).into_arguments();
    assert_eq!(args.len(), 12);
}
