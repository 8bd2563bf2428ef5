//! Training loop behaviour: loss goes down, clipping engages, snapshots
//! carry trained parameters.

use danci_dkvmn::{
    backward_sequence, logging, Dkvmn, DkvmnConfig, DkvmnSnapshot, Matrix, OptimizerConfig, Sgd,
};

fn model() -> Dkvmn {
    Dkvmn::new(&DkvmnConfig {
        memory_size: 4,
        key_dim: 3,
        value_dim: 3,
        batch_size: 2,
        init_std: 0.1,
        seed: Some(7),
    })
    .unwrap()
}

fn sequence(steps: usize) -> (Vec<Matrix>, Vec<Matrix>) {
    let q = (0..steps)
        .map(|t| Matrix::from_vec(2, 3, (0..6).map(|v| ((v + 2 * t) as f64 * 0.9).sin()).collect()).unwrap())
        .collect();
    let qa = (0..steps)
        .map(|t| Matrix::from_vec(2, 3, (0..6).map(|v| ((v + t) as f64 * 0.4).cos()).collect()).unwrap())
        .collect();
    (q, qa)
}

/// L = ½ Σ_t ‖r_t - target‖²; returns the loss and dL/dr_t.
fn loss_and_grads(model: &Dkvmn, q: &[Matrix], qa: &[Matrix]) -> (f64, Vec<Matrix>) {
    let target = 0.5;
    let trace = model.forward_sequence(q, qa).unwrap();
    let mut loss = 0.0;
    let mut grads = Vec::new();
    for read in trace.read_contents() {
        let diff: Vec<f64> = read.data().iter().map(|r| r - target).collect();
        loss += 0.5 * diff.iter().map(|d| d * d).sum::<f64>();
        grads.push(Matrix::from_vec(read.rows(), read.cols(), diff).unwrap());
    }
    (loss, grads)
}

#[test]
fn training_reduces_loss() {
    logging::init_tracing("danci_dkvmn=debug");

    let mut model = model();
    let (q, qa) = sequence(4);
    let mut sgd = Sgd::new(OptimizerConfig {
        learning_rate: 0.01,
        momentum: 0.0,
        max_grad_norm: 50.0,
    })
    .unwrap();

    let (initial, _) = loss_and_grads(&model, &q, &qa);
    for _ in 0..50 {
        let trace = model.forward_sequence(&q, &qa).unwrap();
        let (_, read_grads) = loss_and_grads(&model, &q, &qa);
        let grads = backward_sequence(&model, &trace, &read_grads, None).unwrap();
        sgd.step(&mut model, &grads).unwrap();
    }
    let (trained, _) = loss_and_grads(&model, &q, &qa);

    assert!(trained < initial, "loss {initial} -> {trained}");
    assert_eq!(sgd.step_count(), 50);
}

#[test]
fn momentum_training_with_defaults_stays_finite() {
    let mut model = model();
    let (q, qa) = sequence(3);
    let mut sgd = Sgd::new(OptimizerConfig::default()).unwrap();

    for _ in 0..20 {
        let trace = model.forward_sequence(&q, &qa).unwrap();
        let (_, read_grads) = loss_and_grads(&model, &q, &qa);
        let grads = backward_sequence(&model, &trace, &read_grads, None).unwrap();
        let report = sgd.step(&mut model, &grads).unwrap();
        assert!(report.grad_norm.is_finite());
        assert!(!report.clipped);
    }

    let trace = model.forward_sequence(&q, &qa).unwrap();
    assert!(danci_dkvmn::diagnose_value_memory(trace.final_memory()).is_healthy);
}

#[test]
fn clipping_reports_and_bounds_step() {
    let mut model = model();
    let (q, qa) = sequence(3);
    let trace = model.forward_sequence(&q, &qa).unwrap();
    let (_, read_grads) = loss_and_grads(&model, &q, &qa);
    let grads = backward_sequence(&model, &trace, &read_grads, None).unwrap();

    let norm = grads.global_norm();
    let mut sgd = Sgd::new(OptimizerConfig {
        learning_rate: 0.1,
        momentum: 0.9,
        max_grad_norm: norm * 0.5,
    })
    .unwrap();
    let before = model.key_memory().clone();
    let report = sgd.step(&mut model, &grads).unwrap();

    assert!(report.clipped);
    // first step: v = 0.5 g, so Δθ = -0.05 g
    for ((&after, &b), &g) in model
        .key_memory()
        .data()
        .iter()
        .zip(before.data())
        .zip(&grads.key_memory)
    {
        assert!((after - (b - 0.05 * g)).abs() < 1e-12);
    }
}

#[test]
fn trained_model_survives_snapshot() {
    let mut model = model();
    let (q, qa) = sequence(2);
    let mut sgd = Sgd::new(OptimizerConfig::default()).unwrap();
    for _ in 0..3 {
        let trace = model.forward_sequence(&q, &qa).unwrap();
        let (_, read_grads) = loss_and_grads(&model, &q, &qa);
        let grads = backward_sequence(&model, &trace, &read_grads, None).unwrap();
        sgd.step(&mut model, &grads).unwrap();
    }

    let json = model.snapshot().to_json().unwrap();
    let restored = Dkvmn::from_snapshot(DkvmnSnapshot::from_json(&json).unwrap()).unwrap();
    assert_eq!(restored, model);

    let original = model.forward_sequence(&q, &qa).unwrap();
    let replayed = restored.forward_sequence(&q, &qa).unwrap();
    assert_eq!(original.final_memory(), replayed.final_memory());
}
