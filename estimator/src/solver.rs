//! Small complex linear solves for pilot resolution
//!
//! Systems are at most M×M (one unknown per transmit antenna), so plain
//! Gaussian elimination with partial pivoting in f64 is sufficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;
use num_traits::Zero;
use std::cmp::Ordering;

/// Least-squares solution of `x · h = y` via the normal equations.
///
/// Returns `None` when `xᴴx` is singular relative to `threshold`.
pub(crate) fn least_squares(
    x: ArrayView2<Complex64>,
    y: ArrayView1<Complex64>,
    threshold: f64,
) -> Option<Array1<Complex64>> {
    let xh = x.t().mapv(|v| v.conj());
    let a = xh.dot(&x);
    let b = xh.dot(&y);
    solve_square(a, b, threshold)
}

/// Solve a square system in place
fn solve_square(
    mut a: Array2<Complex64>,
    mut b: Array1<Complex64>,
    threshold: f64,
) -> Option<Array1<Complex64>> {
    let n = a.nrows();
    let tolerance = threshold * max_norm(&a)?;

    for col in 0..n {
        let pivot = pivot_row(&a, col, col)?;
        if a[[pivot, col]].norm() <= tolerance {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap((col, k), (pivot, k));
            }
            b.swap(col, pivot);
        }

        let p = a[[col, col]];
        for row in col + 1..n {
            let factor = a[[row, col]] / p;
            if factor.is_zero() {
                continue;
            }
            for k in col..n {
                let v = a[[col, k]];
                a[[row, k]] -= factor * v;
            }
            let v = b[col];
            b[row] -= factor * v;
        }
    }

    let mut h = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[[row, k]] * h[k];
        }
        h[row] = acc / a[[row, row]];
    }
    Some(h)
}

/// Numerical rank of a (rows × cols) matrix
pub(crate) fn rank(x: ArrayView2<Complex64>, threshold: f64) -> usize {
    let mut a = x.to_owned();
    let (rows, cols) = a.dim();
    let Some(scale) = max_norm(&a) else {
        return 0;
    };
    let tolerance = threshold * scale;

    let mut rank = 0;
    for col in 0..cols {
        if rank == rows {
            break;
        }
        let Some(pivot) = pivot_row(&a, rank, col) else {
            break;
        };
        if a[[pivot, col]].norm() <= tolerance {
            continue;
        }
        if pivot != rank {
            for k in 0..cols {
                a.swap((rank, k), (pivot, k));
            }
        }

        let p = a[[rank, col]];
        for row in rank + 1..rows {
            let factor = a[[row, col]] / p;
            for k in col..cols {
                let v = a[[rank, k]];
                a[[row, k]] -= factor * v;
            }
        }
        rank += 1;
    }
    rank
}

/// Row in `from..` with the largest magnitude in `col`
fn pivot_row(a: &Array2<Complex64>, from: usize, col: usize) -> Option<usize> {
    (from..a.nrows()).max_by(|&i, &j| {
        a[[i, col]]
            .norm()
            .partial_cmp(&a[[j, col]].norm())
            .unwrap_or(Ordering::Equal)
    })
}

/// Largest element magnitude; `None` for an all-zero or non-finite matrix
fn max_norm(a: &Array2<Complex64>) -> Option<f64> {
    let scale = a.iter().map(|v| v.norm()).fold(0.0, f64::max);
    (scale > 0.0 && scale.is_finite()).then_some(scale)
}
