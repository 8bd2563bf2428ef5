//! Head Groups
//!
//! A head group binds addressing and reading to one memory's shape
//! `(memory_size, state_dim)`. Two flavours exist:
//!
//! - [`HeadGroup`]: read-only, used for the key memory
//! - [`WriteHeadGroup`]: read + erase/add write, used for the value memory
//!
//! Only `WriteHeadGroup` has a `write` method, so a write through the key
//! head cannot be expressed.

mod write;

pub use write::{Gates, WriteHeadGroup};
pub(crate) use write::apply_write;

use crate::addressing::correlation_weight;
use crate::error::{ensure_batch, ensure_dim, DkvmnError, Result};
use crate::matrix::vec_add_scaled;
use crate::types::{Matrix, SlotMemory};

/// What drives the slot selection of a read.
#[derive(Clone, Copy, Debug)]
pub enum Addressing<'a> {
    /// Compute the weight from this control input against the memory being read.
    Control(&'a Matrix),
    /// Use a precomputed `(batch_size, memory_size)` weight.
    Weight(&'a Matrix),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadGroup {
    memory_size: usize,
    state_dim: usize,
}

impl HeadGroup {
    pub fn new(memory_size: usize, state_dim: usize) -> Result<Self> {
        if memory_size == 0 || state_dim == 0 {
            return Err(DkvmnError::InvalidConfig(format!(
                "head group needs non-zero dims, got memory_size={memory_size} state_dim={state_dim}"
            )));
        }
        Ok(Self {
            memory_size,
            state_dim,
        })
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub(crate) fn check_memory<M: SlotMemory + ?Sized>(&self, memory: &M) -> Result<()> {
        ensure_dim("memory slots", self.memory_size, memory.memory_size())?;
        ensure_dim("memory state dim", self.state_dim, memory.state_dim())
    }

    /// Weight must be `(batch, memory_size)`; batch must match a batched memory.
    pub(crate) fn check_weight<M: SlotMemory + ?Sized>(&self, memory: &M, weight: &Matrix) -> Result<()> {
        ensure_dim("weight slots", self.memory_size, weight.cols())?;
        if let Some(batch_size) = memory.batch_size() {
            ensure_batch(batch_size, weight.rows())?;
        }
        Ok(())
    }

    /// Correlation weight of `control` against `memory`.
    pub fn addressing<M: SlotMemory + ?Sized>(&self, control: &Matrix, memory: &M) -> Result<Matrix> {
        self.check_memory(memory)?;
        correlation_weight(control, memory)
    }

    /// Weighted sum over slots: r[b] = Σ_i w[b, i] · memory[b, i].
    ///
    /// Returns `(batch_size, state_dim)`.
    pub fn read<M: SlotMemory + ?Sized>(&self, memory: &M, by: Addressing<'_>) -> Result<Matrix> {
        self.check_memory(memory)?;
        let computed;
        let weight = match by {
            Addressing::Weight(w) => {
                self.check_weight(memory, w)?;
                w
            }
            Addressing::Control(control) => {
                computed = correlation_weight(control, memory)?;
                &computed
            }
        };

        let mut content = Matrix::zeros(weight.rows(), self.state_dim);
        for b in 0..weight.rows() {
            let w = weight.row(b);
            let out = content.row_mut(b);
            for (i, &wi) in w.iter().enumerate() {
                vec_add_scaled(out, memory.slot(b, i), wi);
            }
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueMemory;

    #[test]
    fn test_new_rejects_zero_dims() {
        assert!(HeadGroup::new(0, 4).is_err());
        assert!(HeadGroup::new(4, 0).is_err());
    }

    #[test]
    fn test_read_with_weight() {
        let head = HeadGroup::new(2, 2).unwrap();
        let memory = ValueMemory::from_vec(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let weight = Matrix::from_rows(&[vec![0.25, 0.75]]).unwrap();

        let r = head.read(&memory, Addressing::Weight(&weight)).unwrap();
        assert_eq!(r.row(0), &[2.5, 3.5]);
    }

    #[test]
    fn test_read_with_control_addresses_same_memory() {
        let head = HeadGroup::new(2, 2).unwrap();
        let memory = ValueMemory::from_vec(1, 2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let control = Matrix::from_rows(&[vec![3.0_f64.ln(), 0.0]]).unwrap();

        // w = [3/4, 1/4] against the value memory itself
        let r = head.read(&memory, Addressing::Control(&control)).unwrap();
        assert!((r.get(0, 0) - 0.75).abs() < 1e-12);
        assert!((r.get(0, 1) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_read_shared_memory_broadcasts_over_batch() {
        let head = HeadGroup::new(2, 1).unwrap();
        let memory = Matrix::from_rows(&[vec![10.0], vec![20.0]]).unwrap();
        let weight = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.5, 0.5], vec![0.0, 1.0]]).unwrap();

        let r = head.read(&memory, Addressing::Weight(&weight)).unwrap();
        assert_eq!(r.data(), &[10.0, 15.0, 20.0]);
    }

    #[test]
    fn test_read_weight_shape_checked() {
        let head = HeadGroup::new(2, 2).unwrap();
        let memory = ValueMemory::zeros(2, 2, 2);

        let wrong_slots = Matrix::zeros(2, 3);
        assert!(head.read(&memory, Addressing::Weight(&wrong_slots)).is_err());

        let wrong_batch = Matrix::zeros(1, 2);
        let err = head.read(&memory, Addressing::Weight(&wrong_batch)).unwrap_err();
        assert!(matches!(err, DkvmnError::BatchMismatch { .. }));
    }

    #[test]
    fn test_read_memory_shape_checked() {
        let head = HeadGroup::new(3, 2).unwrap();
        let memory = ValueMemory::zeros(1, 2, 2);
        let weight = Matrix::zeros(1, 3);
        assert!(head.read(&memory, Addressing::Weight(&weight)).is_err());
    }
}
