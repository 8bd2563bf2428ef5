//! Analytic gradients through a recorded sequence.
//!
//! Per timestep, with upstream gradients G' = dL/dM' and g_r = dL/dr:
//!
//! ```text
//! dM[b,i,j] = G'[b,i,j] (1 - w[b,i] e[b,j]) + g_r[b,j] w[b,i]
//! dw[b,i]   = Σ_j G'[b,i,j] (a[b,j] - M[b,i,j] e[b,j]) + Σ_j g_r[b,j] M[b,i,j]
//! de[b,j]   = -Σ_i G'[b,i,j] M[b,i,j] w[b,i]
//! da[b,j]   = Σ_i G'[b,i,j] w[b,i]
//! ds[b,i]   = w[b,i] (dw[b,i] - Σ_k w[b,k] dw[b,k])          (softmax)
//! dq        = ds K,   dK += ds^T q
//! ```
//!
//! Gate pre-activations use e(1-e) and 1-a². The initial memory is the
//! template broadcast over the batch, so its gradient is summed over items.

use crate::error::{ensure_batch, ensure_dim, DkvmnError, Result};
use crate::linear::LinearGrads;
use crate::matrix::{matmul, matmul_transposed_lhs_acc, sum_of_squares};
use crate::types::{Matrix, ValueMemory};

use super::{Dkvmn, SequenceTrace, StepRecord};

/// Gradients of a scalar loss with respect to every trainable parameter and
/// every control input of a sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct DkvmnGrads {
    /// `(memory_size, key_dim)`
    pub key_memory: Vec<f64>,
    /// `(memory_size, value_dim)`
    pub value_template: Vec<f64>,
    pub erase: LinearGrads,
    pub add: LinearGrads,
    /// Per timestep `(batch_size, key_dim)`, for training the question embedding
    pub q_controls: Vec<Matrix>,
    /// Per timestep `(batch_size, value_dim)`, for training the answer embedding
    pub qa_controls: Vec<Matrix>,
}

impl DkvmnGrads {
    fn zeros(model: &Dkvmn, steps: usize) -> Self {
        Self {
            key_memory: vec![0.0; model.key_memory().data().len()],
            value_template: vec![0.0; model.value_template().data().len()],
            erase: LinearGrads::zeros_like(model.value_head().erase()),
            add: LinearGrads::zeros_like(model.value_head().add()),
            q_controls: Vec::with_capacity(steps),
            qa_controls: Vec::with_capacity(steps),
        }
    }

    /// Parameter gradients in optimizer order: key memory, value template,
    /// erase weight, erase bias, add weight, add bias.
    pub fn param_slices(&self) -> [&[f64]; 6] {
        [
            &self.key_memory,
            &self.value_template,
            &self.erase.weight,
            &self.erase.bias,
            &self.add.weight,
            &self.add.bias,
        ]
    }

    /// L2 norm over all parameter gradients (control gradients excluded).
    pub fn global_norm(&self) -> f64 {
        let sum = sum_of_squares(&self.key_memory)
            + sum_of_squares(&self.value_template)
            + self.erase.sum_of_squares()
            + self.add.sum_of_squares();
        sum.sqrt()
    }
}

/// Backpropagate through `trace`.
///
/// `read_grads[t]` is dL/d(read content at t), `(batch_size, value_dim)`.
/// `final_memory_grad` is dL/d(value memory after the last write); `None`
/// means the loss does not depend on it.
pub fn backward_sequence(
    model: &Dkvmn,
    trace: &SequenceTrace,
    read_grads: &[Matrix],
    final_memory_grad: Option<&ValueMemory>,
) -> Result<DkvmnGrads> {
    if trace.is_empty() {
        return Err(DkvmnError::EmptySequence);
    }
    check_trace(model, trace)?;
    ensure_dim("read grad timesteps", trace.len(), read_grads.len())?;
    for g in read_grads {
        ensure_dim("read grad batch", model.batch_size(), g.rows())?;
        ensure_dim("read grad dim", model.value_dim(), g.cols())?;
    }

    let final_memory = trace.final_memory();
    let mut grad_memory = match final_memory_grad {
        Some(g) => {
            ensure_batch(final_memory.batch_size(), g.batch_size())?;
            ensure_dim("final memory grad slots", final_memory.memory_size(), g.memory_size())?;
            ensure_dim("final memory grad state dim", final_memory.state_dim(), g.state_dim())?;
            g.data().to_vec()
        }
        None => vec![0.0; final_memory.data().len()],
    };

    let mut grads = DkvmnGrads::zeros(model, trace.len());
    let mut q_grads = Vec::with_capacity(trace.len());
    let mut qa_grads = Vec::with_capacity(trace.len());
    for (record, grad_read) in trace.steps().iter().zip(read_grads).rev() {
        let (before, q_grad, qa_grad) =
            backward_step(model, record, grad_read, &grad_memory, &mut grads)?;
        grad_memory = before;
        q_grads.push(q_grad);
        qa_grads.push(qa_grad);
    }
    q_grads.reverse();
    qa_grads.reverse();
    grads.q_controls = q_grads;
    grads.qa_controls = qa_grads;

    // initial memory is the broadcast template: sum its gradient over the batch
    let item_len = grads.value_template.len();
    for item in grad_memory.chunks(item_len.max(1)) {
        for (g, &v) in grads.value_template.iter_mut().zip(item) {
            *g += v;
        }
    }

    Ok(grads)
}

/// The trace must have been recorded by a model of the same shape.
fn check_trace(model: &Dkvmn, trace: &SequenceTrace) -> Result<()> {
    let final_memory = trace.final_memory();
    ensure_batch(model.batch_size(), final_memory.batch_size())?;
    ensure_dim("trace memory slots", model.memory_size(), final_memory.memory_size())?;
    ensure_dim("trace memory state dim", model.value_dim(), final_memory.state_dim())?;
    for record in trace.steps() {
        ensure_batch(model.batch_size(), record.correlation_weight.rows())?;
        ensure_dim("trace weight slots", model.memory_size(), record.correlation_weight.cols())?;
        ensure_dim("trace q control dim", model.key_dim(), record.q_control.cols())?;
        ensure_dim("trace qa control dim", model.value_dim(), record.qa_control.cols())?;
    }
    Ok(())
}

/// One reverse step. Returns (dL/dM before the write, dL/dq, dL/dqa).
fn backward_step(
    model: &Dkvmn,
    record: &StepRecord,
    grad_read: &Matrix,
    grad_after: &[f64],
    grads: &mut DkvmnGrads,
) -> Result<(Vec<f64>, Matrix, Matrix)> {
    let batch_size = model.batch_size();
    let memory_size = model.memory_size();
    let value_dim = model.value_dim();
    let key_dim = model.key_dim();

    let w = &record.correlation_weight;
    let e = &record.gates.erase;
    let a = &record.gates.add;
    let m = record.memory_before.data();

    let mut grad_before = vec![0.0; m.len()];
    let mut grad_w = Matrix::zeros(batch_size, memory_size);
    let mut grad_erase = Matrix::zeros(batch_size, value_dim);
    let mut grad_add = Matrix::zeros(batch_size, value_dim);

    for b in 0..batch_size {
        let (wb, eb, ab, gr) = (w.row(b), e.row(b), a.row(b), grad_read.row(b));
        for i in 0..memory_size {
            let base = (b * memory_size + i) * value_dim;
            let wi = wb[i];
            let mut gw = 0.0;
            for j in 0..value_dim {
                let g = grad_after[base + j];
                let mv = m[base + j];
                grad_before[base + j] = g * (1.0 - wi * eb[j]) + gr[j] * wi;
                gw += g * (ab[j] - mv * eb[j]) + gr[j] * mv;
                grad_erase.row_mut(b)[j] -= g * mv * wi;
                grad_add.row_mut(b)[j] += g * wi;
            }
            grad_w.set(b, i, gw);
        }
    }

    // sigmoid' = e(1-e), tanh' = 1-a²
    for (g, &ev) in grad_erase.data_mut().iter_mut().zip(e.data()) {
        *g *= ev * (1.0 - ev);
    }
    for (g, &av) in grad_add.data_mut().iter_mut().zip(a.data()) {
        *g *= 1.0 - av * av;
    }

    let head = model.value_head();
    let mut qa_grad = head
        .erase()
        .backward(&record.qa_control, &grad_erase, &mut grads.erase)?;
    let qa_grad_add = head
        .add()
        .backward(&record.qa_control, &grad_add, &mut grads.add)?;
    for (g, &v) in qa_grad.data_mut().iter_mut().zip(qa_grad_add.data()) {
        *g += v;
    }

    // softmax backward
    let mut grad_scores = Matrix::zeros(batch_size, memory_size);
    for b in 0..batch_size {
        let wb = w.row(b);
        let gwb = grad_w.row(b);
        let inner: f64 = wb.iter().zip(gwb).map(|(&wk, &gk)| wk * gk).sum();
        for (i, s) in grad_scores.row_mut(b).iter_mut().enumerate() {
            *s = wb[i] * (gwb[i] - inner);
        }
    }

    // s = q K^T
    let q_grad = Matrix::from_vec(
        batch_size,
        key_dim,
        matmul(
            grad_scores.data(),
            model.key_memory().data(),
            batch_size,
            memory_size,
            key_dim,
        ),
    )?;
    matmul_transposed_lhs_acc(
        &mut grads.key_memory,
        grad_scores.data(),
        record.q_control.data(),
        batch_size,
        memory_size,
        key_dim,
    );

    Ok((grad_before, q_grad, qa_grad))
}
