//! Common Types and Constants
//!
//! Row-major tensors shared by every module. Shapes are carried next to the
//! flat buffer and checked at construction, so a `Matrix` or `ValueMemory`
//! that exists always has `data.len()` equal to the product of its dims.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_dim, DkvmnError, Result};

// ==================== Constants ====================

/// Largest magnitude a healthy value memory entry may reach. One write moves
/// an entry by at most 1.
pub const MAX_MEMORY_ABS: f64 = 1e6;

/// Snapshot format version (for migration)
pub const SNAPSHOT_VERSION: &str = "1";

// ==================== Matrix ====================

/// 2D tensor, row-major.
///
/// Used for control inputs `(batch_size, dim)`, key memory
/// `(memory_size, key_dim)`, correlation weights `(batch_size, memory_size)`
/// and read content `(batch_size, value_dim)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixRepr", into = "MatrixRepr")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct MatrixRepr {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<MatrixRepr> for Matrix {
    type Error = DkvmnError;

    fn try_from(repr: MatrixRepr) -> Result<Self> {
        Matrix::from_vec(repr.rows, repr.cols, repr.data)
    }
}

impl From<Matrix> for MatrixRepr {
    fn from(m: Matrix) -> Self {
        MatrixRepr {
            rows: m.rows,
            cols: m.cols,
            data: m.data,
        }
    }
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        ensure_dim("matrix buffer length", rows * cols, data.len())?;
        Ok(Self { rows, cols, data })
    }

    /// Build from row vectors; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            ensure_dim("matrix row length", cols, row.len())?;
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }
}

// ==================== Value Memory ====================

/// 3D tensor `(batch_size, memory_size, state_dim)`, row-major.
///
/// One independent memory per batch item; item `b` occupies the contiguous
/// range `b * memory_size * state_dim .. (b + 1) * memory_size * state_dim`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueMemory {
    batch_size: usize,
    memory_size: usize,
    state_dim: usize,
    data: Vec<f64>,
}

impl ValueMemory {
    pub fn zeros(batch_size: usize, memory_size: usize, state_dim: usize) -> Self {
        Self {
            batch_size,
            memory_size,
            state_dim,
            data: vec![0.0; batch_size * memory_size * state_dim],
        }
    }

    pub fn from_vec(
        batch_size: usize,
        memory_size: usize,
        state_dim: usize,
        data: Vec<f64>,
    ) -> Result<Self> {
        ensure_dim(
            "value memory buffer length",
            batch_size * memory_size * state_dim,
            data.len(),
        )?;
        Ok(Self {
            batch_size,
            memory_size,
            state_dim,
            data,
        })
    }

    /// Copy a `(memory_size, state_dim)` template into every batch item.
    pub fn broadcast(template: &Matrix, batch_size: usize) -> Self {
        let mut data = Vec::with_capacity(batch_size * template.data().len());
        for _ in 0..batch_size {
            data.extend_from_slice(template.data());
        }
        Self {
            batch_size,
            memory_size: template.rows(),
            state_dim: template.cols(),
            data,
        }
    }

    /// Stack single-item memories along the batch dimension.
    pub fn stack(items: &[ValueMemory]) -> Result<Self> {
        let first = items.first().ok_or(DkvmnError::EmptySequence)?;
        let (memory_size, state_dim) = (first.memory_size, first.state_dim);
        let mut data = Vec::new();
        let mut batch_size = 0;
        for item in items {
            ensure_dim("stacked memory slots", memory_size, item.memory_size)?;
            ensure_dim("stacked memory state dim", state_dim, item.state_dim)?;
            data.extend_from_slice(&item.data);
            batch_size += item.batch_size;
        }
        Ok(Self {
            batch_size,
            memory_size,
            state_dim,
            data,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flat `(memory_size, state_dim)` block of one batch item.
    pub fn item(&self, batch: usize) -> &[f64] {
        let len = self.memory_size * self.state_dim;
        &self.data[batch * len..(batch + 1) * len]
    }

    /// Copy one batch item out as a `batch_size == 1` memory.
    pub fn item_memory(&self, batch: usize) -> ValueMemory {
        ValueMemory {
            batch_size: 1,
            memory_size: self.memory_size,
            state_dim: self.state_dim,
            data: self.item(batch).to_vec(),
        }
    }

    pub fn slot_mut(&mut self, batch: usize, slot: usize) -> &mut [f64] {
        let start = (batch * self.memory_size + slot) * self.state_dim;
        &mut self.data[start..start + self.state_dim]
    }
}

// ==================== Slot Addressing ====================

/// A memory that can be addressed slot by slot.
///
/// Shared memories (the key memory) report `batch_size() == None` and hand
/// every batch item the same slot vectors.
pub trait SlotMemory {
    fn memory_size(&self) -> usize;
    fn state_dim(&self) -> usize;
    fn batch_size(&self) -> Option<usize>;
    fn slot(&self, batch: usize, slot: usize) -> &[f64];
}

impl SlotMemory for Matrix {
    fn memory_size(&self) -> usize {
        self.rows
    }

    fn state_dim(&self) -> usize {
        self.cols
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }

    fn slot(&self, _batch: usize, slot: usize) -> &[f64] {
        self.row(slot)
    }
}

impl SlotMemory for ValueMemory {
    fn memory_size(&self) -> usize {
        self.memory_size
    }

    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }

    fn slot(&self, batch: usize, slot: usize) -> &[f64] {
        let start = (batch * self.memory_size + slot) * self.state_dim;
        &self.data[start..start + self.state_dim]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_from_vec_rejects_bad_length() {
        let err = Matrix::from_vec(2, 3, vec![0.0; 5]).unwrap_err();
        assert!(matches!(
            err,
            DkvmnError::DimensionMismatch {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_matrix_from_rows_ragged() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Matrix::from_rows(&rows).is_err());
    }

    #[test]
    fn test_broadcast_copies_template_per_item() {
        let template = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let memory = ValueMemory::broadcast(&template, 3);

        assert_eq!(memory.batch_size(), 3);
        for b in 0..3 {
            assert_eq!(memory.item(b), template.data());
        }
    }

    #[test]
    fn test_slot_indexing() {
        let memory = ValueMemory::from_vec(2, 2, 2, (0..8).map(|v| v as f64).collect()).unwrap();
        assert_eq!(memory.slot(1, 0), &[4.0, 5.0]);
        assert_eq!(memory.slot(0, 1), &[2.0, 3.0]);
    }

    #[test]
    fn test_matrix_deserialize_validates_shape() {
        let json = r#"{"rows":2,"cols":2,"data":[1.0,2.0,3.0]}"#;
        assert!(serde_json::from_str::<Matrix>(json).is_err());

        let json = r#"{"rows":1,"cols":2,"data":[1.0,2.0]}"#;
        let m: Matrix = serde_json::from_str(json).unwrap();
        assert_eq!(m.row(0), &[1.0, 2.0]);
    }
}
