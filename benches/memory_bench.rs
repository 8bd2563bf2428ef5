use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use danci_dkvmn::{backward_sequence, Dkvmn, DkvmnConfig, Matrix};

// dimensions of the default training config
fn model(batch_size: usize) -> Dkvmn {
    Dkvmn::new(&DkvmnConfig {
        batch_size,
        seed: Some(1),
        ..DkvmnConfig::default()
    })
    .expect("default config is valid")
}

fn controls(batch_size: usize, dim: usize, phase: usize) -> Matrix {
    Matrix::from_vec(
        batch_size,
        dim,
        (0..batch_size * dim)
            .map(|i| ((i + phase) as f64 * 0.01).sin())
            .collect(),
    )
    .expect("sized buffer")
}

fn bench_attention(c: &mut Criterion) {
    let mut group = c.benchmark_group("attention");
    for batch_size in [1, 32, 128] {
        let model = model(batch_size);
        let q = controls(batch_size, model.key_dim(), 0);
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| black_box(model.attention(black_box(&q)).unwrap()))
        });
    }
    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    for batch_size in [1, 32, 128] {
        let model = model(batch_size);
        let memory = model.init_value_memory();
        let q = controls(batch_size, model.key_dim(), 0);
        let qa = controls(batch_size, model.value_dim(), 7);
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| black_box(model.step(&memory, black_box(&q), black_box(&qa)).unwrap()))
        });
    }
    group.finish();
}

fn bench_backward(c: &mut Criterion) {
    let steps = 20;
    let mut group = c.benchmark_group("backward_sequence");
    group.sample_size(20);
    for batch_size in [1, 32] {
        let model = model(batch_size);
        let q: Vec<Matrix> = (0..steps).map(|t| controls(batch_size, model.key_dim(), t)).collect();
        let qa: Vec<Matrix> = (0..steps)
            .map(|t| controls(batch_size, model.value_dim(), 3 * t))
            .collect();
        let trace = model.forward_sequence(&q, &qa).unwrap();
        let read_grads = vec![controls(batch_size, model.value_dim(), 1); steps];

        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, _| {
            b.iter(|| black_box(backward_sequence(&model, &trace, &read_grads, None).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_attention, bench_step, bench_backward);
criterion_main!(benches);
