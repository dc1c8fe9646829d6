/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Unit conversion utilities
//!
//! Scattering angles are given in degrees, wavelengths and d-spacings in
//! Angstrom and momentum transfer in inverse Angstrom.

use std::f64::consts::PI;

use super::constants::ANGSTROM_PER_METER;

/// Convert a wavelength from meters (PONI convention) to Angstrom
pub fn meters_to_angstrom(meters: f64) -> f64 {
    meters * ANGSTROM_PER_METER
}

/// Convert a wavelength from Angstrom to meters
pub fn angstrom_to_meters(angstrom: f64) -> f64 {
    angstrom / ANGSTROM_PER_METER
}

/// Convert 2θ (degrees) to q = 4π·sin(θ)/λ
pub fn tth_to_q(tth: f64, wavelength: f64) -> f64 {
    4.0 * PI * (tth.to_radians() / 2.0).sin() / wavelength
}

/// Convert q to 2θ (degrees); NaN when q is not reachable at this wavelength
pub fn q_to_tth(q: f64, wavelength: f64) -> f64 {
    2.0 * (q * wavelength / (4.0 * PI)).asin().to_degrees()
}

/// Convert 2θ (degrees) to d = λ/(2·sin(θ))
pub fn tth_to_d(tth: f64, wavelength: f64) -> f64 {
    wavelength / (2.0 * (tth.to_radians() / 2.0).sin())
}

/// Convert d to 2θ (degrees); NaN when d < λ/2
pub fn d_to_tth(d: f64, wavelength: f64) -> f64 {
    2.0 * (wavelength / (2.0 * d)).asin().to_degrees()
}

/// Convert q to d = 2π/q
pub fn q_to_d(q: f64) -> f64 {
    2.0 * PI / q
}

/// Convert d to q = 2π/d
pub fn d_to_q(d: f64) -> f64 {
    2.0 * PI / d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_through_q_and_d() {
        let wavelength = 0.3344;
        for i in 1..60 {
            let tth = i as f64 - 0.5;
            let q = tth_to_q(tth, wavelength);
            let d = q_to_d(q);
            assert_relative_eq!(d_to_tth(d, wavelength), tth, epsilon = 1e-10);
            assert_relative_eq!(q_to_tth(q, wavelength), tth, epsilon = 1e-10);
            assert_relative_eq!(tth_to_d(tth, wavelength), d, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_wavelength_units() {
        assert_relative_eq!(meters_to_angstrom(4.06626e-11), 0.406626, epsilon = 1e-12);
        assert_relative_eq!(angstrom_to_meters(0.406626), 4.06626e-11, epsilon = 1e-20);
    }

    #[test]
    fn test_unreachable_d_is_nan() {
        assert!(d_to_tth(0.1, 0.5).is_nan());
    }
}
