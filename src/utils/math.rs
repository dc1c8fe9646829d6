/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Mathematical utility functions
//!
//! Interpolation on tabulated data, Legendre polynomials and their
//! least-squares fit, and the arithmetic mean.

use super::errors::{Result, UtilsError};
use super::linear_algebra::{cholesky_solve, normal_equations};
use faer::Mat;

/// Linear interpolation between two points
///
/// # Arguments
///
/// * `x` - The x-coordinate at which to interpolate
/// * `x0` - The x-coordinate of the first known point
/// * `y0` - The y-coordinate of the first known point
/// * `x1` - The x-coordinate of the second known point
/// * `y1` - The y-coordinate of the second known point
///
/// # Returns
///
/// The interpolated y-value at x
pub fn linear_interpolate(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < 1e-15 {
        return y0; // Avoid division by zero
    }

    let t = (x - x0) / (x1 - x0);
    y0 * (1.0 - t) + y1 * t
}

/// Linearly interpolate a tabulated function at many points
///
/// `x_values` must be monotonic (ascending or descending). Points outside
/// the table are clamped to the nearest end value; callers that must not
/// extrapolate restrict `x_new` to the table range first.
pub fn interpolate(x_new: &[f64], x_values: &[f64], y_values: &[f64]) -> Result<Vec<f64>> {
    if x_values.len() != y_values.len() {
        return Err(UtilsError::Generic(
            "x_values and y_values must have the same length".to_string(),
        ));
    }
    if x_values.is_empty() {
        return Err(UtilsError::Generic(
            "Empty arrays provided for interpolation".to_string(),
        ));
    }
    if x_values.len() == 1 {
        return Ok(vec![y_values[0]; x_new.len()]);
    }

    let descending = x_values[0] > x_values[x_values.len() - 1];
    let (xs, ys): (Vec<f64>, Vec<f64>) = if descending {
        (
            x_values.iter().rev().copied().collect(),
            y_values.iter().rev().copied().collect(),
        )
    } else {
        (x_values.to_vec(), y_values.to_vec())
    };

    let last = xs.len() - 1;
    Ok(x_new
        .iter()
        .map(|&x| {
            if x <= xs[0] {
                return ys[0];
            }
            if x >= xs[last] {
                return ys[last];
            }
            // First index with xs[idx] > x
            let idx = xs.partition_point(|&v| v <= x);
            linear_interpolate(x, xs[idx - 1], ys[idx - 1], xs[idx], ys[idx])
        })
        .collect())
}

/// Values of the Legendre polynomials P_0..P_degree at u
pub fn legendre_basis(u: f64, degree: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(degree + 1);
    values.push(1.0);
    if degree >= 1 {
        values.push(u);
    }
    for n in 2..=degree {
        // Recurrence relation: n·P_n(u) = (2n-1)·u·P_{n-1}(u) - (n-1)·P_{n-2}(u)
        let nf = n as f64;
        let p = ((2.0 * nf - 1.0) * u * values[n - 1] - (nf - 1.0) * values[n - 2]) / nf;
        values.push(p);
    }
    values
}

/// Least-squares fit of a Legendre series of the given degree
///
/// The abscissae must already be mapped onto [-1, 1]. Returns the series
/// coefficients c_0..c_degree.
pub fn legendre_fit(u: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    if u.len() != y.len() {
        return Err(UtilsError::Generic(
            "u and y must have the same length".to_string(),
        ));
    }
    if u.len() <= degree {
        return Err(UtilsError::Math(format!(
            "Need more than {} data points for a degree {} fit, got {}",
            degree,
            degree,
            u.len()
        )));
    }

    let mut design = Mat::<f64>::zeros(u.len(), degree + 1);
    for (i, &ui) in u.iter().enumerate() {
        for (j, p) in legendre_basis(ui, degree).into_iter().enumerate() {
            design[(i, j)] = p;
        }
    }
    let (ata, aty) = normal_equations(&design, y)?;
    cholesky_solve(&ata, &aty)
}

/// Evaluate a Legendre series at u
pub fn legendre_evaluate(u: f64, coeffs: &[f64]) -> f64 {
    if coeffs.is_empty() {
        return 0.0;
    }
    legendre_basis(u, coeffs.len() - 1)
        .iter()
        .zip(coeffs)
        .map(|(p, c)| p * c)
        .sum()
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interpolate_inside_and_clamped() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 20.0];
        let out = interpolate(&[-1.0, 0.5, 1.5, 3.0], &xs, &ys).unwrap();
        assert_eq!(out, vec![0.0, 5.0, 15.0, 20.0]);
    }

    #[test]
    fn test_interpolate_descending_table() {
        let xs = [2.0, 1.0, 0.0];
        let ys = [20.0, 10.0, 0.0];
        let out = interpolate(&[0.25], &xs, &ys).unwrap();
        assert_relative_eq!(out[0], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_legendre_basis_values() {
        let p = legendre_basis(0.5, 3);
        assert_relative_eq!(p[2], 0.5 * (3.0 * 0.25 - 1.0), epsilon = 1e-12);
        assert_relative_eq!(p[3], 0.5 * (5.0 * 0.125 - 3.0 * 0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_legendre_fit_recovers_quadratic() {
        let u: Vec<f64> = (0..101).map(|i| -1.0 + i as f64 * 0.02).collect();
        let y: Vec<f64> = u.iter().map(|&x| 3.0 - 2.0 * x + 0.5 * x * x).collect();
        let coeffs = legendre_fit(&u, &y, 4).unwrap();
        for (&ui, &yi) in u.iter().zip(&y) {
            assert_relative_eq!(legendre_evaluate(ui, &coeffs), yi, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_mean() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(mean(&[]), 0.0);
    }
}
