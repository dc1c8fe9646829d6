/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

use approx::assert_relative_eq;
use dioptas_rs::utils::linear_algebra::{mat_from_rows, solve};
use dioptas_rs::utils::math::{interpolate, legendre_evaluate, legendre_fit};
use dioptas_rs::utils::{angstrom_to_meters, constants, d_to_q, meters_to_angstrom, q_to_d, q_to_tth, tth_to_d, tth_to_q};

#[test]
fn test_unit_conversions() {
    // Test meter ↔ Angstrom conversions
    let meters = 0.3344e-10;
    let angstrom = meters_to_angstrom(meters);
    assert_relative_eq!(angstrom, 0.3344, epsilon = 1e-12);
    assert_relative_eq!(angstrom_to_meters(angstrom), meters, epsilon = 1e-22);
    assert_relative_eq!(
        meters_to_angstrom(1.0),
        constants::ANGSTROM_PER_METER,
        epsilon = 1e-10
    );

    // Test 2θ → q → 2θ and d ↔ q
    let wavelength = 0.406626;
    let tth = 14.2;
    let q = tth_to_q(tth, wavelength);
    assert_relative_eq!(q_to_tth(q, wavelength), tth, epsilon = 1e-10);
    assert_relative_eq!(tth_to_d(tth, wavelength), q_to_d(q), epsilon = 1e-10);
    assert_relative_eq!(d_to_q(q_to_d(q)), q, epsilon = 1e-10);
}

#[test]
fn test_unreachable_q_is_nan() {
    // sin θ > 1
    assert!(q_to_tth(40.0, 0.4).is_nan());
}

#[test]
fn test_interpolation_clamps_to_table() {
    let x = [1.0, 2.0, 4.0];
    let y = [10.0, 20.0, 0.0];
    let out = interpolate(&[0.0, 1.5, 3.0, 5.0], &x, &y).unwrap();
    assert_eq!(out, vec![10.0, 15.0, 10.0, 0.0]);
    assert!(interpolate(&[1.0], &x, &y[..2]).is_err());
}

#[test]
fn test_legendre_fit_of_cubic() {
    let u: Vec<f64> = (0..41).map(|i| -1.0 + i as f64 * 0.05).collect();
    let y: Vec<f64> = u.iter().map(|&v| v * v * v - 0.5 * v + 2.0).collect();
    let coeffs = legendre_fit(&u, &y, 3).unwrap();
    // x³ = (2·P₃ + 3·P₁)/5
    assert_relative_eq!(coeffs[0], 2.0, epsilon = 1e-10);
    assert_relative_eq!(coeffs[1], 0.6 - 0.5, epsilon = 1e-10);
    assert_relative_eq!(coeffs[2], 0.0, epsilon = 1e-10);
    assert_relative_eq!(coeffs[3], 0.4, epsilon = 1e-10);
    assert_relative_eq!(legendre_evaluate(0.3, &coeffs), 0.027 - 0.15 + 2.0, epsilon = 1e-10);
}

#[test]
fn test_dense_solve() {
    let a = mat_from_rows(&[vec![4.0, 1.0, 0.0], vec![1.0, 3.0, 1.0], vec![0.0, 1.0, 2.0]]);
    let x = solve(&a, &[1.0, 2.0, 3.0]).unwrap();
    let residual = [
        4.0 * x[0] + x[1] - 1.0,
        x[0] + 3.0 * x[1] + x[2] - 2.0,
        x[1] + 2.0 * x[2] - 3.0,
    ];
    for r in residual {
        assert_relative_eq!(r, 0.0, epsilon = 1e-12);
    }
}
