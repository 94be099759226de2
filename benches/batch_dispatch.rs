use criterion::*;
use std::hint::black_box;

use batch_compute::{inout, ComputeEngine};

const AXPY: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;

@compute @workgroup_size(256)
fn axpy(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&b)) { b[id.x] = 2.0 * a[id.x] + b[id.x]; }
}
"#;

const ELEMENTS: u32 = 1 << 20;

fn batch_round_trip_benchmark(c: &mut Criterion) {
    let engine = ComputeEngine::new();
    if !engine.available() {
        println!("No GPU adapter available, skipping benchmark");
        return;
    }
    engine.load_library(AXPY).unwrap();

    let a = vec![1.0f32; ELEMENTS as usize];
    let mut b = vec![0.0f32; ELEMENTS as usize];

    c.bench_function("axpy_round_trip_1M", |bench| {
        bench.iter(|| {
            engine
                .new_batch()
                .unwrap()
                .with_grid(1, ELEMENTS, 1, 256)
                .call("axpy", (&a, inout(&mut b)))
                .unwrap()
                .dispatch()
                .unwrap()
                .wait()
                .unwrap();
        });
    });

    c.bench_function("axpy_chain_8_calls_1M", |bench| {
        bench.iter(|| {
            let x = inout(&mut b);
            let mut builder = engine.new_batch().unwrap();
            for _ in 0..8 {
                builder = builder.with_grid(1, ELEMENTS, 1, 256).call("axpy", (&a, &x)).unwrap();
            }
            builder.dispatch().unwrap().wait().unwrap();
        });
    });

    black_box(&b);
}

criterion_group!(benches, batch_round_trip_benchmark);
criterion_main!(benches);
