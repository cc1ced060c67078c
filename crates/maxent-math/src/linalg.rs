// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Linalg
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Linear algebra utilities for the small dense systems of the MaxEnt step.
//!
//! Jacobi eigendecomposition of symmetric matrices and an eigen-truncated
//! solve that drops directions the quadratic form cannot support.

use ndarray::{Array1, Array2, ArrayView1, Zip};

/// Sweeps before the Jacobi iteration gives up.
const MAX_SWEEPS: usize = 100;

/// Off-diagonal mass below which the matrix is treated as diagonal.
const OFF_DIAG_TOL: f64 = 1e-14;

/// Default relative eigenvalue cutoff for [`solve_symmetric_truncated`].
pub const DEFAULT_EIGEN_CUTOFF: f64 = 1e-12;

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns (eigenvalues, eigenvectors as columns), sorted by ascending
/// eigenvalue. Only the upper triangle needs to be meaningful; the input is
/// symmetrised first.
pub fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    assert_eq!(m, n, "symmetric_eigen needs a square matrix, got {m}x{n}");

    let mut s = symmetrize(a);
    let mut v = Array2::eye(n);

    for _ in 0..MAX_SWEEPS {
        let mut off_diag = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                off_diag += s[[i, j]].abs();
            }
        }
        if off_diag < OFF_DIAG_TOL || !off_diag.is_finite() {
            break;
        }

        for i in 0..n {
            for j in (i + 1)..n {
                if s[[i, j]].abs() < 1e-300 {
                    continue;
                }
                let tau = (s[[j, j]] - s[[i, i]]) / (2.0 * s[[i, j]]);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let cos = 1.0 / (1.0 + t * t).sqrt();
                let sin = t * cos;

                let sii = s[[i, i]];
                let sjj = s[[j, j]];
                let sij = s[[i, j]];
                s[[i, i]] = cos * cos * sii - 2.0 * sin * cos * sij + sin * sin * sjj;
                s[[j, j]] = sin * sin * sii + 2.0 * sin * cos * sij + cos * cos * sjj;
                s[[i, j]] = 0.0;
                s[[j, i]] = 0.0;

                for r in 0..n {
                    if r == i || r == j {
                        continue;
                    }
                    let ri = s[[r, i]];
                    let rj = s[[r, j]];
                    s[[r, i]] = cos * ri - sin * rj;
                    s[[i, r]] = s[[r, i]];
                    s[[r, j]] = sin * ri + cos * rj;
                    s[[j, r]] = s[[r, j]];
                }

                for r in 0..n {
                    let vi = v[[r, i]];
                    let vj = v[[r, j]];
                    v[[r, i]] = cos * vi - sin * vj;
                    v[[r, j]] = sin * vi + cos * vj;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        s[[i, i]]
            .partial_cmp(&s[[j, j]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut values = Array1::zeros(n);
    let mut vectors = Array2::zeros((n, n));
    for (idx, &col) in order.iter().enumerate() {
        values[idx] = s[[col, col]];
        vectors.column_mut(idx).assign(&v.column(col));
    }
    (values, vectors)
}

/// Solution of a symmetric system restricted to its well-conditioned
/// positive eigen-directions.
#[derive(Debug, Clone)]
pub struct TruncatedSolve {
    pub x: Array1<f64>,
    /// Number of eigen-directions given a zero component.
    pub dropped: usize,
}

/// Solve `A x = b` for symmetric `A`, keeping only eigen-directions with
/// eigenvalue above `rel_cutoff * max|lambda|`.
///
/// Non-positive and negligible directions receive a zero component, so a
/// degenerate or indefinite `A` yields the minimum-norm step over the
/// directions it does support rather than an error.
pub fn solve_symmetric_truncated(
    a: &Array2<f64>,
    b: ArrayView1<f64>,
    rel_cutoff: f64,
) -> TruncatedSolve {
    let n = b.len();
    assert_eq!(a.dim(), (n, n), "matrix/rhs dimension mismatch");

    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return TruncatedSolve {
            x: Array1::zeros(n),
            dropped: n,
        };
    }

    let (values, vectors) = symmetric_eigen(a);
    let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let cutoff = rel_cutoff * scale;

    let mut x = Array1::zeros(n);
    let mut dropped = 0;
    for k in 0..n {
        let lambda = values[k];
        if scale == 0.0 || lambda <= cutoff {
            dropped += 1;
            continue;
        }
        let v = vectors.column(k);
        let coeff = v.dot(&b) / lambda;
        x.scaled_add(coeff, &v);
    }
    TruncatedSolve { x, dropped }
}

/// `(A + A^T) / 2`.
pub fn symmetrize(a: &Array2<f64>) -> Array2<f64> {
    let at = a.t();
    let mut out = a.clone();
    Zip::from(&mut out).and(&at).for_each(|o, &t| *o = 0.5 * (*o + t));
    out
}

/// Weighted inner product `sum(w * x * y)`.
pub fn weighted_dot(x: ArrayView1<f64>, y: ArrayView1<f64>, w: ArrayView1<f64>) -> f64 {
    Zip::from(&x)
        .and(&y)
        .and(&w)
        .fold(0.0, |acc, &a, &b, &c| acc + a * b * c)
}
