//! Content Addressing
//!
//! Correlation weight of a control vector against every memory slot:
//!
//! - similarity: s[b, i] = control[b] · memory[b, i]
//! - weight:     w[b, i] = softmax_i(s[b, i])
//!
//! No learned parameters. When the memory is shared (key memory) the same
//! slot vectors are scored for every batch item.

use crate::error::{ensure_batch, ensure_dim, DkvmnError, Result};
use crate::matrix::{dot_product, softmax_rows};
use crate::types::{Matrix, SlotMemory};

/// Compute the correlation weight `(batch_size, memory_size)`.
pub fn correlation_weight<M: SlotMemory + ?Sized>(control: &Matrix, memory: &M) -> Result<Matrix> {
    let memory_size = memory.memory_size();
    if memory_size == 0 {
        return Err(DkvmnError::InvalidConfig(
            "memory must have at least one slot".to_string(),
        ));
    }
    ensure_dim("control state dim", memory.state_dim(), control.cols())?;
    if let Some(batch_size) = memory.batch_size() {
        ensure_batch(batch_size, control.rows())?;
    }

    let mut weight = similarity_scores(control, memory);
    softmax_rows(weight.data_mut(), memory_size);
    Ok(weight)
}

/// Raw dot-product scores before normalisation.
fn similarity_scores<M: SlotMemory + ?Sized>(control: &Matrix, memory: &M) -> Matrix {
    let memory_size = memory.memory_size();
    let mut scores = Matrix::zeros(control.rows(), memory_size);
    for b in 0..control.rows() {
        let c = control.row(b);
        let row = scores.row_mut(b);
        for (i, score) in row.iter_mut().enumerate() {
            *score = dot_product(c, memory.slot(b, i));
        }
    }
    scores
}
