//! Erase/add write path.
//!
//! For every batch item b, slot i and state dimension j:
//!
//! ```text
//! e = sigmoid(erase(control))           in (0, 1)
//! a = tanh(add(control))                in (-1, 1)
//! M'[b, i, j] = M[b, i, j] * (1 - w[b, i] * e[b, j]) + w[b, i] * a[b, j]
//! ```
//!
//! The old memory is never modified; each write returns a fresh tensor.

use rand::Rng;
use rayon::prelude::*;

use super::{Addressing, HeadGroup};
use crate::error::{ensure_batch, ensure_dim, Result};
use crate::linear::Linear;
use crate::matrix::sigmoid;
use crate::types::{Matrix, SlotMemory, ValueMemory};

/// Gate activations for one write, both `(batch_size, state_dim)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Gates {
    pub erase: Matrix,
    pub add: Matrix,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteHeadGroup {
    head: HeadGroup,
    erase: Linear,
    add: Linear,
}

impl WriteHeadGroup {
    /// Gating layers are `state_dim -> state_dim`, weights N(0, init_std^2), zero bias.
    pub fn new<R: Rng + ?Sized>(
        memory_size: usize,
        state_dim: usize,
        init_std: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let head = HeadGroup::new(memory_size, state_dim)?;
        let erase = Linear::init_normal(state_dim, state_dim, init_std, rng)?;
        let add = Linear::init_normal(state_dim, state_dim, init_std, rng)?;
        Ok(Self { head, erase, add })
    }

    pub fn from_parts(memory_size: usize, state_dim: usize, erase: Linear, add: Linear) -> Result<Self> {
        let head = HeadGroup::new(memory_size, state_dim)?;
        for layer in [&erase, &add] {
            ensure_dim("gate input dim", state_dim, layer.in_dim())?;
            ensure_dim("gate output dim", state_dim, layer.out_dim())?;
        }
        Ok(Self { head, erase, add })
    }

    pub fn memory_size(&self) -> usize {
        self.head.memory_size()
    }

    pub fn state_dim(&self) -> usize {
        self.head.state_dim()
    }

    pub fn erase(&self) -> &Linear {
        &self.erase
    }

    pub fn add(&self) -> &Linear {
        &self.add
    }

    pub(crate) fn layers_mut(&mut self) -> (&mut Linear, &mut Linear) {
        (&mut self.erase, &mut self.add)
    }

    pub fn addressing<M: SlotMemory + ?Sized>(&self, control: &Matrix, memory: &M) -> Result<Matrix> {
        self.head.addressing(control, memory)
    }

    pub fn read<M: SlotMemory + ?Sized>(&self, memory: &M, by: Addressing<'_>) -> Result<Matrix> {
        self.head.read(memory, by)
    }

    /// Erase and add signals for `control`.
    pub fn gates(&self, control: &Matrix) -> Result<Gates> {
        let mut erase = self.erase.forward(control)?;
        erase.data_mut().iter_mut().for_each(|v| *v = sigmoid(*v));
        let mut add = self.add.forward(control)?;
        add.data_mut().iter_mut().for_each(|v| *v = v.tanh());
        Ok(Gates { erase, add })
    }

    /// Write `control` into `memory`. When `write_weight` is `None` the weight
    /// is computed by addressing `memory` with `control`.
    pub fn write(
        &self,
        control: &Matrix,
        memory: &ValueMemory,
        write_weight: Option<&Matrix>,
    ) -> Result<ValueMemory> {
        self.head.check_memory(memory)?;
        ensure_batch(memory.batch_size(), control.rows())?;
        let computed;
        let weight = match write_weight {
            Some(w) => {
                self.head.check_weight(memory, w)?;
                w
            }
            None => {
                computed = self.head.addressing(control, memory)?;
                &computed
            }
        };
        let gates = self.gates(control)?;
        Ok(apply_write(memory, weight, &gates))
    }
}

/// Erase-then-add over every batch item in parallel. Shapes are checked by the caller.
pub(crate) fn apply_write(memory: &ValueMemory, weight: &Matrix, gates: &Gates) -> ValueMemory {
    let memory_size = memory.memory_size();
    let state_dim = memory.state_dim();
    let mut next = memory.clone();
    let item_len = memory_size * state_dim;
    if item_len == 0 {
        return next;
    }

    next.data_mut()
        .par_chunks_mut(item_len)
        .enumerate()
        .for_each(|(b, item)| {
            let w = weight.row(b);
            let e = gates.erase.row(b);
            let a = gates.add.row(b);
            for (i, slot) in item.chunks_mut(state_dim).enumerate() {
                let wi = w[i];
                for (j, m) in slot.iter_mut().enumerate() {
                    *m = *m * (1.0 - wi * e[j]) + wi * a[j];
                }
            }
        });
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// erase = sigmoid(0) = 0.5, add = tanh(control)
    fn scripted_head(memory_size: usize, state_dim: usize) -> WriteHeadGroup {
        let mut identity = Matrix::zeros(state_dim, state_dim);
        for i in 0..state_dim {
            identity.set(i, i, 1.0);
        }
        let erase = Linear::zeros(state_dim, state_dim);
        let add = Linear::from_parts(identity, vec![0.0; state_dim]).unwrap();
        WriteHeadGroup::from_parts(memory_size, state_dim, erase, add).unwrap()
    }

    #[test]
    fn test_gates_are_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let head = WriteHeadGroup::new(4, 3, 5.0, &mut rng).unwrap();
        let control = Matrix::from_rows(&[vec![40.0, -40.0, 3.0], vec![-1.0, 0.5, 100.0]]).unwrap();

        let gates = head.gates(&control).unwrap();
        assert!(gates.erase.data().iter().all(|&e| (0.0..=1.0).contains(&e)));
        assert!(gates.add.data().iter().all(|&a| (-1.0..=1.0).contains(&a)));
    }

    #[test]
    fn test_write_formula() {
        let head = scripted_head(2, 2);
        let memory = ValueMemory::from_vec(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let weight = Matrix::from_rows(&[vec![0.5, 0.5]]).unwrap();
        let control = Matrix::from_rows(&[vec![0.0, 0.5_f64.atanh()]]).unwrap();

        // erase mult = 1 - 0.5 * 0.5 = 0.75, add = 0.5 * [0, 0.5]
        let next = head.write(&control, &memory, Some(&weight)).unwrap();
        let expected = [0.75, 1.75, 2.25, 3.25];
        for (got, want) in next.data().iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12, "got {} want {}", got, want);
        }
        // old memory untouched
        assert_eq!(memory.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_one_hot_weight_only_changes_addressed_slot() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let head = WriteHeadGroup::new(3, 2, 0.5, &mut rng).unwrap();
        let memory = ValueMemory::from_vec(1, 3, 2, vec![1.0, -1.0, 2.0, 0.5, -3.0, 4.0]).unwrap();
        let weight = Matrix::from_rows(&[vec![0.0, 1.0, 0.0]]).unwrap();
        let control = Matrix::from_rows(&[vec![0.7, -0.2]]).unwrap();

        let next = head.write(&control, &memory, Some(&weight)).unwrap();
        assert_eq!(next.slot(0, 0), memory.slot(0, 0));
        assert_eq!(next.slot(0, 2), memory.slot(0, 2));
        assert_ne!(next.slot(0, 1), memory.slot(0, 1));
    }

    #[test]
    fn test_write_without_weight_addresses_memory() {
        let head = scripted_head(2, 2);
        let memory = ValueMemory::from_vec(1, 2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let control = Matrix::from_rows(&[vec![3.0_f64.ln(), 0.0]]).unwrap();

        let implicit = head.write(&control, &memory, None).unwrap();
        let weight = head.addressing(&control, &memory).unwrap();
        let explicit = head.write(&control, &memory, Some(&weight)).unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_write_batch_mismatch() {
        let head = scripted_head(2, 2);
        let memory = ValueMemory::zeros(2, 2, 2);
        let control = Matrix::zeros(1, 2);
        assert!(head.write(&control, &memory, None).is_err());
    }

    #[test]
    fn test_from_parts_rejects_wrong_gate_shape() {
        let erase = Linear::zeros(3, 2);
        let add = Linear::zeros(2, 2);
        assert!(WriteHeadGroup::from_parts(2, 2, erase, add).is_err());
    }
}
