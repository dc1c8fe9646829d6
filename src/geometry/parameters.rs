/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Geometry parameters and radial units

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::errors::{GeometryError, Result};
use crate::utils::conversions::meters_to_angstrom;

/// Radial unit of an integrated pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Unit {
    /// Scattering angle 2θ in degrees
    #[default]
    TwoTheta,
    /// Momentum transfer q = 4π·sin(θ)/λ in inverse Angstrom
    Q,
    /// Lattice spacing d = λ/(2·sin(θ)) in Angstrom
    D,
}

impl Unit {
    /// Convert a scattering angle 2θ (radians) into this unit
    pub fn from_tth_rad(self, tth: f64, wavelength_angstrom: f64) -> f64 {
        match self {
            Unit::TwoTheta => tth.to_degrees(),
            Unit::Q => 4.0 * std::f64::consts::PI * (tth / 2.0).sin() / wavelength_angstrom,
            Unit::D => wavelength_angstrom / (2.0 * (tth / 2.0).sin()),
        }
    }

    /// Short name used in file headers
    pub fn label(self) -> &'static str {
        match self {
            Unit::TwoTheta => "2th_deg",
            Unit::Q => "q_A^-1",
            Unit::D => "d_A",
        }
    }
}

/// The free parameters of the detector projection
///
/// Lengths are in meters and angles in radians, following the PONI file
/// convention: axis 1 runs along image rows (slow axis), axis 2 along
/// columns (fast axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryParameters {
    /// Sample to detector distance
    pub distance: f64,
    /// Point of normal incidence along axis 1
    pub poni1: f64,
    /// Point of normal incidence along axis 2
    pub poni2: f64,
    /// Rotation about axis 1
    pub rot1: f64,
    /// Rotation about axis 2
    pub rot2: f64,
    /// Rotation about the beam axis
    pub rot3: f64,
    /// Pixel size along axis 1 at native resolution
    pub pixel1: f64,
    /// Pixel size along axis 2 at native resolution
    pub pixel2: f64,
    /// X-ray wavelength
    pub wavelength: f64,
    /// Degree of linear polarization in (-1, 1]
    pub polarization_factor: f64,
}

impl Default for GeometryParameters {
    fn default() -> Self {
        Self {
            distance: 0.2,
            poni1: 0.0,
            poni2: 0.0,
            rot1: 0.0,
            rot2: 0.0,
            rot3: 0.0,
            pixel1: 79e-6,
            pixel2: 79e-6,
            wavelength: 0.3344e-10,
            polarization_factor: 0.99,
        }
    }
}

impl GeometryParameters {
    /// Wavelength in Angstrom
    pub fn wavelength_angstrom(&self) -> f64 {
        meters_to_angstrom(self.wavelength)
    }

    /// Pixel sizes seen by an image supersampled by `factor`
    pub fn pixel_size(&self, factor: usize) -> (f64, f64) {
        let s = factor.max(1) as f64;
        (self.pixel1 / s, self.pixel2 / s)
    }

    /// Hash of the bit patterns of all parameters
    pub fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for v in [
            self.distance,
            self.poni1,
            self.poni2,
            self.rot1,
            self.rot2,
            self.rot3,
            self.pixel1,
            self.pixel2,
            self.wavelength,
            self.polarization_factor,
        ] {
            v.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Check that the parameters describe a physical setup
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.distance,
            self.poni1,
            self.poni2,
            self.rot1,
            self.rot2,
            self.rot3,
            self.pixel1,
            self.pixel2,
            self.wavelength,
            self.polarization_factor,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::InvalidParameter(
                "parameters must be finite".to_string(),
            ));
        }
        if self.distance <= 0.0 {
            return Err(GeometryError::InvalidParameter(format!(
                "distance must be positive, got {}",
                self.distance
            )));
        }
        if self.pixel1 <= 0.0 || self.pixel2 <= 0.0 {
            return Err(GeometryError::InvalidParameter(
                "pixel sizes must be positive".to_string(),
            ));
        }
        if self.wavelength <= 0.0 {
            return Err(GeometryError::InvalidParameter(
                "wavelength must be positive".to_string(),
            ));
        }
        if self.polarization_factor <= -1.0 || self.polarization_factor > 1.0 {
            return Err(GeometryError::InvalidParameter(format!(
                "polarization factor {} outside (-1, 1]",
                self.polarization_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hash_changes_with_parameters() {
        let a = GeometryParameters::default();
        let mut b = a;
        assert_eq!(a.hash_key(), b.hash_key());
        b.rot1 = 1e-6;
        assert_ne!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn test_supersampled_pixel_size() {
        let params = GeometryParameters::default();
        let (p1, p2) = params.pixel_size(2);
        assert_relative_eq!(p1, 39.5e-6);
        assert_relative_eq!(p2, 39.5e-6);
    }

    #[test]
    fn test_validation() {
        let mut params = GeometryParameters::default();
        assert!(params.validate().is_ok());
        params.distance = -1.0;
        assert!(params.validate().is_err());
        params.distance = 0.1;
        params.polarization_factor = -1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_unit_conversion_from_radians() {
        let tth = 10f64.to_radians();
        assert_relative_eq!(Unit::TwoTheta.from_tth_rad(tth, 0.5), 10.0, epsilon = 1e-12);
        let d = Unit::D.from_tth_rad(tth, 0.5);
        let q = Unit::Q.from_tth_rad(tth, 0.5);
        assert_relative_eq!(q * d, 2.0 * std::f64::consts::PI, epsilon = 1e-12);
    }
}
