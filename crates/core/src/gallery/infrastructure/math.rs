//! Linear-algebra helpers for diversity scoring.
//!
//! Diversity of a subset is the log-determinant of the Gram matrix of its
//! unit-normalized embeddings: the log squared volume of the parallelotope
//! they span.

use nalgebra::DMatrix;
use ndarray::{Array2, Axis};

use crate::gallery::domain::embedding::Embedding;

/// Added to norms before dividing so zero vectors stay finite.
const NORM_EPSILON: f64 = 1e-8;

/// Stacks embeddings as rows scaled to unit length.
///
/// All embeddings are expected to share one dimension; shorter rows are
/// zero-padded to the longest.
pub fn normalized_rows(embeddings: &[Embedding]) -> Array2<f64> {
    let dim = embeddings.iter().map(Embedding::dimension).max().unwrap_or(0);
    let mut rows = Array2::<f64>::zeros((embeddings.len(), dim));
    for (mut row, embedding) in rows.axis_iter_mut(Axis(0)).zip(embeddings) {
        let norm = embedding.norm() + NORM_EPSILON;
        for (dst, v) in row.iter_mut().zip(embedding.values()) {
            *dst = *v as f64 / norm;
        }
    }
    rows
}

/// Log-determinant of the Gram matrix of `rows[indices]`.
pub fn subset_log_det(rows: &Array2<f64>, indices: &[usize]) -> f64 {
    let subset = rows.select(Axis(0), indices);
    let gram = subset.dot(&subset.t());
    let n = gram.nrows();
    log_det(DMatrix::from_fn(n, n, |i, j| gram[[i, j]]))
}

/// Log-determinant of a symmetric positive semi-definite matrix.
///
/// Any positive determinant yields its finite logarithm, however small, so
/// near-degenerate subsets still rank by volume. Only a zero or negative
/// determinant yields `-inf`.
pub fn log_det(gram: DMatrix<f64>) -> f64 {
    if gram.is_empty() {
        return 0.0;
    }
    if let Some(cholesky) = gram.clone().cholesky() {
        return cholesky.l().diagonal().iter().map(|d| 2.0 * d.ln()).sum();
    }
    // Rounding can push a tiny positive pivot below zero; LU still sees the
    // sign of the determinant as a whole.
    let det = gram.lu().determinant();
    if det > 0.0 {
        det.ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// `n choose k`, saturating at `u64::MAX`.
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u64;
    let n = n as u64;
    let mut result: u64 = 1;
    for i in 0..k {
        // Exact at every step: result * (n - i) is divisible by (i + 1).
        result = match result.checked_mul(n - i) {
            Some(v) => v / (i + 1),
            None => return u64::MAX,
        };
    }
    result
}

/// All `k`-subsets of `0..n` in lexicographic order.
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    exhausted: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            exhausted: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.exhausted {
            return None;
        }
        let current = self.indices.clone();

        let k = self.indices.len();
        // Rightmost position that can still advance.
        match (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in (i + 1)..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.exhausted = true,
        }
        Some(current)
    }
}
