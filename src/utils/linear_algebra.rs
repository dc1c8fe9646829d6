/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Dense linear algebra on Faer matrices
//!
//! The systems solved by the engine are small (normal equations of at most a
//! few dozen unknowns), so they are factorized directly on `faer::Mat`
//! storage.

#![allow(clippy::needless_range_loop)]

use super::errors::{Result, UtilsError};
use faer::Mat;
use rayon::prelude::*;

/// Relative pivot size below which a matrix is treated as singular
pub const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Build a Faer matrix from row slices
pub fn mat_from_rows(rows: &[Vec<f64>]) -> Mat<f64> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, |r| r.len());
    let mut m = Mat::<f64>::zeros(nrows, ncols);
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            m[(i, j)] = v;
        }
    }
    m
}

/// Form the normal equations AᵀA·x = Aᵀy of a linear least-squares problem
///
/// `design` holds one row per observation and one column per unknown.
pub fn normal_equations(design: &Mat<f64>, y: &[f64]) -> Result<(Mat<f64>, Vec<f64>)> {
    let n_obs = design.nrows();
    let n_par = design.ncols();
    if y.len() != n_obs {
        return Err(UtilsError::Generic(format!(
            "design matrix has {} rows but {} observations were given",
            n_obs,
            y.len()
        )));
    }

    // Each column pair is independent, so the Gram matrix is filled in parallel
    let gram_rows: Vec<(Vec<f64>, f64)> = (0..n_par)
        .into_par_iter()
        .map(|a| {
            let mut row = vec![0.0; n_par];
            for b in a..n_par {
                let mut sum = 0.0;
                for i in 0..n_obs {
                    sum += design[(i, a)] * design[(i, b)];
                }
                row[b] = sum;
            }
            let mut rhs = 0.0;
            for i in 0..n_obs {
                rhs += design[(i, a)] * y[i];
            }
            (row, rhs)
        })
        .collect();

    let mut ata = Mat::<f64>::zeros(n_par, n_par);
    let mut aty = vec![0.0; n_par];
    for (a, (row, rhs)) in gram_rows.into_iter().enumerate() {
        for b in a..n_par {
            ata[(a, b)] = row[b];
            ata[(b, a)] = row[b];
        }
        aty[a] = rhs;
    }
    Ok((ata, aty))
}

/// Solve A·x = b by Gaussian elimination with partial pivoting
pub fn solve(a: &Mat<f64>, b: &[f64]) -> Result<Vec<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(UtilsError::Generic(format!(
            "cannot solve a {}x{} system with {} right-hand values",
            n,
            a.ncols(),
            b.len()
        )));
    }

    let mut m = a.clone();
    let mut rhs = b.to_vec();
    let scale = (0..n).map(|i| m[(i, i)].abs()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);

    for i in 0..n {
        // Find pivot
        let mut max_row = i;
        let mut max_val = m[(i, i)].abs();
        for r in (i + 1)..n {
            if m[(r, i)].abs() > max_val {
                max_row = r;
                max_val = m[(r, i)].abs();
            }
        }
        if max_val <= SINGULAR_TOLERANCE * scale || !max_val.is_finite() {
            return Err(UtilsError::Singular {
                row: i,
                pivot: max_val,
            });
        }

        if max_row != i {
            for c in 0..n {
                let tmp = m[(i, c)];
                m[(i, c)] = m[(max_row, c)];
                m[(max_row, c)] = tmp;
            }
            rhs.swap(i, max_row);
        }

        // Eliminate below
        for r in (i + 1)..n {
            let factor = m[(r, i)] / m[(i, i)];
            if factor == 0.0 {
                continue;
            }
            for c in i..n {
                m[(r, c)] -= factor * m[(i, c)];
            }
            rhs[r] -= factor * rhs[i];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += m[(i, j)] * x[j];
        }
        x[i] = (rhs[i] - sum) / m[(i, i)];
    }
    Ok(x)
}

/// Solve a symmetric positive definite system by Cholesky factorization
///
/// Fails with [`UtilsError::Singular`] when a pivot falls below
/// [`SINGULAR_TOLERANCE`] relative to the largest diagonal element, which is
/// how rank deficiency of a Jacobian shows up in its normal matrix.
pub fn cholesky_solve(a: &Mat<f64>, b: &[f64]) -> Result<Vec<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(UtilsError::Generic(format!(
            "cannot factorize a {}x{} system with {} right-hand values",
            n,
            a.ncols(),
            b.len()
        )));
    }

    let scale = (0..n).map(|i| a[(i, i)].abs()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
    let mut l = Mat::<f64>::zeros(n, n);

    for j in 0..n {
        let mut diag = a[(j, j)];
        for k in 0..j {
            diag -= l[(j, k)] * l[(j, k)];
        }
        if diag.is_nan() || diag <= SINGULAR_TOLERANCE * scale {
            return Err(UtilsError::Singular { row: j, pivot: diag });
        }
        let ljj = diag.sqrt();
        l[(j, j)] = ljj;
        for i in (j + 1)..n {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = sum / ljj;
        }
    }

    // Forward substitution L·z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * z[k];
        }
        z[i] = sum / l[(i, i)];
    }

    // Back substitution Lᵀ·x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[(k, i)] * x[k];
        }
        x[i] = sum / l[(i, i)];
    }
    Ok(x)
}
