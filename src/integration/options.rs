/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Integration parameters

use serde::{Deserialize, Serialize};

use super::errors::{IntegrationError, Result};
use crate::geometry::Unit;
use crate::utils::constants::DEFAULT_CAKE_POINTS;

/// Parameters shared by the 1D and 2D integrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOptions {
    /// Radial unit of the 1D pattern
    pub unit: Unit,
    /// Number of radial bins of the 1D pattern, ⌈hypot(sH, sW)/2⌉ when unset
    pub bins: Option<usize>,
    /// Restrict the radial axis to this range, in `unit`
    pub radial_range: Option<(f64, f64)>,
    /// Restrict the azimuth to this range in degrees
    pub azimuth_range: Option<(f64, f64)>,
    /// Radial bins of the cake
    pub cake_radial_bins: usize,
    /// Azimuthal bins of the cake
    pub cake_azimuth_bins: usize,
    /// Divide intensities by the polarization factor
    pub polarization_correction: bool,
    /// Weight pixels by their solid angle
    pub solid_angle_correction: bool,
    /// Supersampling factor of the image handed to the integrator
    pub supersampling: usize,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            unit: Unit::TwoTheta,
            bins: None,
            radial_range: None,
            azimuth_range: None,
            cake_radial_bins: DEFAULT_CAKE_POINTS,
            cake_azimuth_bins: DEFAULT_CAKE_POINTS,
            polarization_correction: true,
            solid_angle_correction: true,
            supersampling: 1,
        }
    }
}

impl IntegrationOptions {
    /// Default bin count for an image of `shape`
    pub fn default_bins(shape: (usize, usize)) -> usize {
        ((shape.0 as f64).hypot(shape.1 as f64) / 2.0).ceil().max(1.0) as usize
    }

    /// Bin count used for an image of `shape`
    pub fn bins_for(&self, shape: (usize, usize)) -> usize {
        self.bins.unwrap_or_else(|| Self::default_bins(shape))
    }

    pub fn validate(&self) -> Result<()> {
        if self.bins == Some(0) || self.cake_radial_bins == 0 || self.cake_azimuth_bins == 0 {
            return Err(IntegrationError::InvalidOption("bin counts must be positive".to_string()));
        }
        if self.supersampling == 0 {
            return Err(IntegrationError::InvalidOption("supersampling must be at least 1".to_string()));
        }
        for (name, range) in [("radial", self.radial_range), ("azimuth", self.azimuth_range)] {
            if let Some((lo, hi)) = range {
                if lo.is_nan() || hi.is_nan() || lo >= hi {
                    return Err(IntegrationError::InvalidOption(format!(
                        "{} range [{}, {}] is empty",
                        name, lo, hi
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bins() {
        assert_eq!(IntegrationOptions::default_bins((2048, 2048)), 1449);
        assert_eq!(IntegrationOptions::default_bins((3, 4)), 3);
    }

    #[test]
    fn test_validation() {
        let mut options = IntegrationOptions::default();
        assert!(options.validate().is_ok());
        options.radial_range = Some((5.0, 5.0));
        assert!(options.validate().is_err());
    }
}
