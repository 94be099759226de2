use criterion::*;
use std::hint::black_box;

use batch_compute::{input, inout, private, reflect_kernels, KernelArgs};

const KERNELS: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> scratch: array<f32>;

@compute @workgroup_size(256)
fn axpy(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&b)) { b[id.x] = 2.0 * a[id.x] + b[id.x]; }
}

@compute @workgroup_size(256)
fn stash(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&b)) { scratch[id.x] = b[id.x]; }
}
"#;

fn wrap_benchmark(c: &mut Criterion) {
    let a = vec![1.0f32; 4096];
    let mut b = vec![0.0f32; 4096];

    c.bench_function("wrap_four_arguments", |bench| {
        bench.iter(|| {
            let args = (&a, inout(&mut b), private(16 * 1024), input(&a[..1024])).into_arguments();
            black_box(args);
        });
    });
}

fn reflect_benchmark(c: &mut Criterion) {
    c.bench_function("reflect_two_kernels", |bench| {
        bench.iter(|| black_box(reflect_kernels(black_box(KERNELS)).unwrap()));
    });
}

criterion_group!(benches, wrap_benchmark, reflect_benchmark);
criterion_main!(benches);
