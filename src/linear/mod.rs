//! Linear Layer
//!
//! Affine projection `y = x W^T + b` used by the erase and add gates.
//! `W` is stored `(out_dim, in_dim)`, row-major.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_dim, DkvmnError, Result};
use crate::matrix::{matmul, matmul_transposed, matmul_transposed_lhs_acc, normal_vec, sum_of_squares};
use crate::types::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LinearRepr", into = "LinearRepr")]
pub struct Linear {
    weight: Matrix,
    bias: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct LinearRepr {
    weight: Matrix,
    bias: Vec<f64>,
}

impl TryFrom<LinearRepr> for Linear {
    type Error = DkvmnError;

    fn try_from(repr: LinearRepr) -> Result<Self> {
        Linear::from_parts(repr.weight, repr.bias)
    }
}

impl From<Linear> for LinearRepr {
    fn from(layer: Linear) -> Self {
        LinearRepr {
            weight: layer.weight,
            bias: layer.bias,
        }
    }
}

impl Linear {
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            weight: Matrix::zeros(out_dim, in_dim),
            bias: vec![0.0; out_dim],
        }
    }

    /// Weight drawn from N(0, std^2), bias zero.
    pub fn init_normal<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        std: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let data = normal_vec(rng, in_dim * out_dim, std);
        Linear::from_parts(Matrix::from_vec(out_dim, in_dim, data)?, vec![0.0; out_dim])
    }

    pub fn from_parts(weight: Matrix, bias: Vec<f64>) -> Result<Self> {
        ensure_dim("linear bias length", weight.rows(), bias.len())?;
        Ok(Self { weight, bias })
    }

    pub fn in_dim(&self) -> usize {
        self.weight.cols()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.rows()
    }

    pub fn weight(&self) -> &Matrix {
        &self.weight
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    pub fn weight_mut(&mut self) -> &mut Matrix {
        &mut self.weight
    }

    pub fn bias_mut(&mut self) -> &mut [f64] {
        &mut self.bias
    }

    /// Weight and bias buffers, for in-place optimizer updates.
    pub(crate) fn params_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (self.weight.data_mut(), &mut self.bias)
    }

    /// `(batch, in_dim) -> (batch, out_dim)`
    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        ensure_dim("linear input dim", self.in_dim(), input.cols())?;
        let (batch, in_dim, out_dim) = (input.rows(), self.in_dim(), self.out_dim());
        let mut out = matmul_transposed(input.data(), self.weight.data(), batch, in_dim, out_dim);
        for row in out.chunks_mut(out_dim.max(1)) {
            for (y, &b) in row.iter_mut().zip(self.bias.iter()) {
                *y += b;
            }
        }
        Matrix::from_vec(batch, out_dim, out)
    }

    /// Accumulate parameter gradients into `grads` and return the input gradient.
    pub fn backward(&self, input: &Matrix, grad_out: &Matrix, grads: &mut LinearGrads) -> Result<Matrix> {
        ensure_dim("linear input dim", self.in_dim(), input.cols())?;
        ensure_dim("linear grad dim", self.out_dim(), grad_out.cols())?;
        ensure_dim("linear grad batch", input.rows(), grad_out.rows())?;
        ensure_dim("linear grad buffer", self.weight.data().len(), grads.weight.len())?;
        let (batch, in_dim, out_dim) = (input.rows(), self.in_dim(), self.out_dim());

        // dW += dY^T X, db += Σ_b dY
        matmul_transposed_lhs_acc(&mut grads.weight, grad_out.data(), input.data(), batch, out_dim, in_dim);
        for b in 0..batch {
            for (gb, &g) in grads.bias.iter_mut().zip(grad_out.row(b)) {
                *gb += g;
            }
        }

        // dX = dY W
        let grad_in = matmul(grad_out.data(), self.weight.data(), batch, out_dim, in_dim);
        Matrix::from_vec(batch, in_dim, grad_in)
    }
}

/// Gradient buffers matching one [`Linear`] layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearGrads {
    pub weight: Vec<f64>,
    pub bias: Vec<f64>,
}

impl LinearGrads {
    pub fn zeros_like(layer: &Linear) -> Self {
        Self {
            weight: vec![0.0; layer.weight.data().len()],
            bias: vec![0.0; layer.bias.len()],
        }
    }

    pub fn sum_of_squares(&self) -> f64 {
        sum_of_squares(&self.weight) + sum_of_squares(&self.bias)
    }
}
