/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Third-order Birch-Murnaghan equation of state with thermal expansion

use serde::{Deserialize, Serialize};

use super::errors::{PhaseError, Result};
use crate::utils::constants::REFERENCE_TEMPERATURE;

/// Newton iteration cap for the volume solve
pub const MAX_EOS_ITERATIONS: usize = 64;
/// Convergence tolerance relative to V₀
pub const EOS_TOLERANCE: f64 = 1e-8;
/// Search bracket for V/V₀
pub const VOLUME_BRACKET: (f64, f64) = (0.5, 1.2);

/// EOS coefficients of a phase
///
/// Moduli in GPa, expansion in 1/K.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EquationOfState {
    pub k0: f64,
    pub k0p: f64,
    pub alpha_t0: f64,
    pub d_alpha_dt: f64,
    pub dk0_dt: f64,
    pub dk0p_dt: f64,
}

/// Pressure of a compressed volume
///
/// # Arguments
///
/// * `v0` - Reference volume
/// * `v` - Volume
/// * `k0` - Bulk modulus
/// * `k0p` - Pressure derivative of the bulk modulus
pub fn birch_murnaghan_pressure(v0: f64, v: f64, k0: f64, k0p: f64) -> f64 {
    let x = (v0 / v).cbrt();
    let x2 = x * x;
    let x5 = x2 * x2 * x;
    let x7 = x5 * x2;
    1.5 * k0 * (x7 - x5) * (1.0 + 0.75 * (k0p - 4.0) * (x2 - 1.0))
}

/// dP/dV of [`birch_murnaghan_pressure`]
fn birch_murnaghan_slope(v0: f64, v: f64, k0: f64, k0p: f64) -> f64 {
    let x = (v0 / v).cbrt();
    let x2 = x * x;
    let x4 = x2 * x2;
    let x5 = x4 * x;
    let x7 = x5 * x2;
    let bracket = 1.0 + 0.75 * (k0p - 4.0) * (x2 - 1.0);
    let dp_dx = 1.5 * k0 * ((7.0 * x4 * x2 - 5.0 * x4) * bracket + (x7 - x5) * 1.5 * (k0p - 4.0) * x);
    dp_dx * (-x / (3.0 * v))
}

/// Volume at pressure `p` by safeguarded Newton iteration
///
/// Steps leaving the bracket [0.5·V₀, 1.2·V₀] fall back to bisection. A zero
/// bulk modulus marks a phase without compression data, whose volume does
/// not change with pressure.
pub fn birch_murnaghan_volume(p: f64, v0: f64, k0: f64, k0p: f64) -> Result<f64> {
    if p == 0.0 || k0 == 0.0 {
        return Ok(v0);
    }
    if k0 < 0.0 || !k0.is_finite() || !p.is_finite() {
        return Err(PhaseError::EosSolve(format!(
            "bulk modulus {} cannot be used at P = {} GPa",
            k0, p
        )));
    }
    let residual = |v: f64| birch_murnaghan_pressure(v0, v, k0, k0p) - p;
    let mut lo = VOLUME_BRACKET.0 * v0;
    let mut hi = VOLUME_BRACKET.1 * v0;
    let (f_lo, f_hi) = (residual(lo), residual(hi));
    if f_lo.signum() == f_hi.signum() {
        return Err(PhaseError::EosSolve(format!(
            "P = {} GPa is outside the volume bracket",
            p
        )));
    }
    let tolerance = EOS_TOLERANCE * v0;
    let mut v = v0;
    for _ in 0..MAX_EOS_ITERATIONS {
        let f = residual(v);
        // P decreases with V
        if f > 0.0 {
            lo = v;
        } else {
            hi = v;
        }
        let slope = birch_murnaghan_slope(v0, v, k0, k0p);
        let mut next = v - f / slope;
        if !next.is_finite() || next <= lo || next >= hi {
            next = 0.5 * (lo + hi);
        }
        if (next - v).abs() < tolerance {
            return Ok(next);
        }
        v = next;
    }
    Err(PhaseError::EosSolve(format!(
        "no convergence after {} iterations at P = {} GPa",
        MAX_EOS_ITERATIONS, p
    )))
}

/// exp(∫ α dT) from the reference temperature to `t`
pub fn thermal_expansion_factor(t: f64, alpha_t0: f64, d_alpha_dt: f64) -> f64 {
    let dt = t - REFERENCE_TEMPERATURE;
    (alpha_t0 * dt + 0.5 * d_alpha_dt * dt * dt).exp()
}

impl EquationOfState {
    /// Moduli adjusted to temperature `t`
    pub fn moduli_at(&self, t: f64) -> (f64, f64) {
        let dt = t - REFERENCE_TEMPERATURE;
        (self.k0 + self.dk0_dt * dt, self.k0p + self.dk0p_dt * dt)
    }

    /// V(P, T) for a phase with reference volume `v0`
    pub fn volume(&self, v0: f64, p: f64, t: f64) -> Result<f64> {
        let (k, kp) = self.moduli_at(t);
        let v_p = birch_murnaghan_volume(p, v0, k, kp)?;
        Ok(v_p * thermal_expansion_factor(t, self.alpha_t0, self.d_alpha_dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pressure_at_ten_percent_compression() {
        // Closed form for K₀ = 160 GPa, K₀' = 4
        let x: f64 = (1.0f64 / 0.9).cbrt();
        let expected = 240.0 * (x.powi(7) - x.powi(5));
        let p = birch_murnaghan_pressure(1.0, 0.9, 160.0, 4.0);
        assert_relative_eq!(p, expected, epsilon = 1e-12);
        assert_relative_eq!(p, 20.8162, epsilon = 1e-4);
    }

    #[test]
    fn test_volume_inverts_pressure() {
        let v0 = 67.8;
        for &p in &[0.5, 10.0, 50.0, 120.0] {
            let v = birch_murnaghan_volume(p, v0, 167.0, 5.5).unwrap();
            assert_relative_eq!(birch_murnaghan_pressure(v0, v, 167.0, 5.5), p, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_slope_matches_finite_difference() {
        let (v0, v, h) = (1.0, 0.93, 1e-6);
        let numeric = (birch_murnaghan_pressure(v0, v + h, 200.0, 4.5)
            - birch_murnaghan_pressure(v0, v - h, 200.0, 4.5))
            / (2.0 * h);
        assert_relative_eq!(birch_murnaghan_slope(v0, v, 200.0, 4.5), numeric, max_relative = 1e-6);
    }

    #[test]
    fn test_out_of_bracket_fails() {
        assert!(matches!(
            birch_murnaghan_volume(5000.0, 1.0, 160.0, 4.0),
            Err(PhaseError::EosSolve(_))
        ));
        assert!(birch_murnaghan_volume(1.0, 1.0, -5.0, 4.0).is_err());
        assert_eq!(birch_murnaghan_volume(10.0, 2.0, 0.0, 4.0).unwrap(), 2.0);
    }

    #[test]
    fn test_reference_state_is_identity() {
        let eos = EquationOfState {
            k0: 160.0,
            k0p: 4.0,
            alpha_t0: 3e-5,
            ..Default::default()
        };
        assert_eq!(eos.volume(10.0, 0.0, REFERENCE_TEMPERATURE).unwrap(), 10.0);
        assert!(eos.volume(10.0, 0.0, 1000.0).unwrap() > 10.0);
    }
}
