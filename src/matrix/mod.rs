//! Matrix Kernels
//!
//! Free functions on flat row-major `f64` slices with explicit dimensions.
//! Activation functions use the numerically stable formulations; non-finite
//! inputs propagate to the output instead of being masked.

use rand::Rng;

/// Dot product
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// a += scale * b
pub fn vec_add_scaled(a: &mut [f64], b: &[f64], scale: f64) {
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai += scale * bi;
    }
}

/// C[m,n] = A[m,k] * B[n,k]^T
pub fn matmul_transposed(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            out[i * n + j] = dot_product(a_row, &b[j * k..(j + 1) * k]);
        }
    }
    out
}

/// C[m,n] = A[m,k] * B[k,n]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let out_row = &mut out[i * n..(i + 1) * n];
        for p in 0..k {
            vec_add_scaled(out_row, &b[p * n..(p + 1) * n], a[i * k + p]);
        }
    }
    out
}

/// C[k,n] += A[m,k]^T * B[m,n]
pub fn matmul_transposed_lhs_acc(out: &mut [f64], a: &[f64], b: &[f64], m: usize, k: usize, n: usize) {
    for i in 0..m {
        let b_row = &b[i * n..(i + 1) * n];
        for p in 0..k {
            vec_add_scaled(&mut out[p * n..(p + 1) * n], b_row, a[i * k + p]);
        }
    }
}

/// In-place softmax, max-subtracted for stability
pub fn softmax_in_place(row: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

/// Row-wise softmax over a `(rows, cols)` buffer
pub fn softmax_rows(data: &mut [f64], cols: usize) {
    if cols == 0 {
        return;
    }
    for row in data.chunks_mut(cols) {
        softmax_in_place(row);
    }
}

/// Sigmoid, branched so `exp` never overflows
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub fn sum_of_squares(a: &[f64]) -> f64 {
    a.iter().map(|&v| v * v).sum()
}

/// Sample from the standard normal distribution using the Box-Muller transform
pub fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 must be non-zero: ln(0) = -inf
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Draw `len` values from N(0, std^2).
pub fn normal_vec<R: Rng + ?Sized>(rng: &mut R, len: usize, std: f64) -> Vec<f64> {
    (0..len).map(|_| sample_standard_normal(rng) * std).collect()
}
