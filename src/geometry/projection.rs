/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Forward and inverse detector projection
//!
//! A pixel center at (i + ½, j + ½) is placed at (p1, p2) on the detector
//! relative to the PONI, rotated by rot1, rot2 and rot3 and projected from
//! the sample at distance D. The lab vector t = M·(p1, p2, D) gives
//! 2θ = atan2(√(t1² + t2²), t3) and χ = atan2(t1, t2).

use ndarray::{Array2, Zip};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use super::errors::Result;
use super::parameters::{GeometryParameters, Unit};

/// Which derived array a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ArrayKind {
    TwoTheta,
    Chi,
    Radial(Unit),
    SolidAngle,
    Polarization(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ArrayKey {
    kind: ArrayKind,
    shape: (usize, usize),
    supersampling: usize,
    params: u64,
}

/// Detector geometry with lazily derived per-pixel arrays
#[derive(Debug, Default)]
pub struct Geometry {
    params: GeometryParameters,
    cache: Mutex<HashMap<ArrayKey, Arc<Array2<f64>>>>,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        Self::new(self.params)
    }
}

impl Geometry {
    /// Create a geometry from a parameter set
    pub fn new(params: GeometryParameters) -> Self {
        Self {
            params,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The current parameter set
    pub fn parameters(&self) -> &GeometryParameters {
        &self.params
    }

    /// Replace the parameter set, invalidating every cached array
    pub fn set_parameters(&mut self, params: GeometryParameters) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.clear_cache();
        Ok(())
    }

    /// Set only the polarization factor
    pub fn set_polarization_factor(&mut self, factor: f64) -> Result<()> {
        let mut params = self.params;
        params.polarization_factor = factor;
        self.set_parameters(params)
    }

    /// Wavelength in Angstrom
    pub fn wavelength_angstrom(&self) -> f64 {
        self.params.wavelength_angstrom()
    }

    /// Drop all cached arrays
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Rotation matrix M with t = M·(p1, p2, D)
    fn rotation_matrix(&self) -> [[f64; 3]; 3] {
        rotation_matrix(&self.params)
    }

    /// 2θ and χ (radians) of a fractional pixel position
    ///
    /// `row` and `col` are pixel-index coordinates of an image supersampled by
    /// `supersampling`; integer values address pixel centers.
    pub fn tth_chi_at(&self, row: f64, col: f64, supersampling: usize) -> (f64, f64) {
        let m = self.rotation_matrix();
        tth_chi(&self.params, &m, row, col, supersampling)
    }

    /// Pixel position (row, col) hit by a ray at (2θ, χ) in radians
    ///
    /// Returns `None` when the ray runs parallel to or away from the detector.
    pub fn pixel_for(&self, tth: f64, chi: f64, supersampling: usize) -> Option<(f64, f64)> {
        let m = self.rotation_matrix();
        let (pixel1, pixel2) = self.params.pixel_size(supersampling);
        let dir = [tth.sin() * chi.sin(), tth.sin() * chi.cos(), tth.cos()];
        let l = self.params.distance;

        // Solve p1·M₀ + p2·M₁ − s·dir = −D·M₂ for (p1, p2, s) by Cramer's rule
        let a = [
            [m[0][0], m[0][1], -dir[0]],
            [m[1][0], m[1][1], -dir[1]],
            [m[2][0], m[2][1], -dir[2]],
        ];
        let b = [-l * m[0][2], -l * m[1][2], -l * m[2][2]];
        let det = det3(&a);
        if det.abs() < 1e-300 {
            return None;
        }
        let mut sol = [0.0; 3];
        for (c, value) in sol.iter_mut().enumerate() {
            let mut ac = a;
            for r in 0..3 {
                ac[r][c] = b[r];
            }
            *value = det3(&ac) / det;
        }
        let (p1, p2, s) = (sol[0], sol[1], sol[2]);
        if s <= 0.0 || !s.is_finite() || !p1.is_finite() || !p2.is_finite() {
            return None;
        }
        Some((
            (p1 + self.params.poni1) / pixel1 - 0.5,
            (p2 + self.params.poni2) / pixel2 - 0.5,
        ))
    }

    /// Points of the Debye ring at 2θ (radians) that fall on a detector of `shape`
    pub fn ring_points(
        &self,
        tth: f64,
        n_points: usize,
        shape: (usize, usize),
        supersampling: usize,
    ) -> Vec<(f64, f64)> {
        (0..n_points)
            .filter_map(|k| {
                let chi = -PI + 2.0 * PI * k as f64 / n_points as f64;
                self.pixel_for(tth, chi, supersampling)
            })
            .filter(|&(row, col)| {
                row >= -0.5
                    && col >= -0.5
                    && row < shape.0 as f64 - 0.5
                    && col < shape.1 as f64 - 0.5
            })
            .collect()
    }

    fn cached<F>(&self, kind: ArrayKind, shape: (usize, usize), supersampling: usize, compute: F) -> Arc<Array2<f64>>
    where
        F: FnOnce() -> Array2<f64>,
    {
        let key = ArrayKey {
            kind,
            shape,
            supersampling: supersampling.max(1),
            params: self.params.hash_key(),
        };
        if let Ok(cache) = self.cache.lock() {
            if let Some(array) = cache.get(&key) {
                return Arc::clone(array);
            }
        }
        log::debug!("computing {:?} array for shape {:?}", kind, shape);
        let array = Arc::new(compute());
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&array));
        }
        array
    }

    /// Per-pixel 2θ in radians
    pub fn tth_array(&self, shape: (usize, usize), supersampling: usize) -> Arc<Array2<f64>> {
        self.cached(ArrayKind::TwoTheta, shape, supersampling, || {
            let m = self.rotation_matrix();
            let mut out = Array2::<f64>::zeros(shape);
            Zip::indexed(&mut out).par_for_each(|(i, j), v| {
                *v = tth_chi(&self.params, &m, i as f64, j as f64, supersampling).0;
            });
            out
        })
    }

    /// Per-pixel azimuth χ in radians, in [-π, π]
    pub fn chi_array(&self, shape: (usize, usize), supersampling: usize) -> Arc<Array2<f64>> {
        self.cached(ArrayKind::Chi, shape, supersampling, || {
            let m = self.rotation_matrix();
            let mut out = Array2::<f64>::zeros(shape);
            Zip::indexed(&mut out).par_for_each(|(i, j), v| {
                *v = tth_chi(&self.params, &m, i as f64, j as f64, supersampling).1;
            });
            out
        })
    }

    /// Per-pixel radial coordinate in the requested unit
    pub fn radial_array(&self, unit: Unit, shape: (usize, usize), supersampling: usize) -> Arc<Array2<f64>> {
        let tth = self.tth_array(shape, supersampling);
        let wavelength = self.wavelength_angstrom();
        self.cached(ArrayKind::Radial(unit), shape, supersampling, || {
            tth.mapv(|t| unit.from_tth_rad(t, wavelength))
        })
    }

    /// Per-pixel solid angle relative to the PONI pixel, cos³ of the incidence angle
    pub fn solid_angle_array(&self, shape: (usize, usize), supersampling: usize) -> Arc<Array2<f64>> {
        self.cached(ArrayKind::SolidAngle, shape, supersampling, || {
            let (pixel1, pixel2) = self.params.pixel_size(supersampling);
            let l = self.params.distance;
            let mut out = Array2::<f64>::zeros(shape);
            Zip::indexed(&mut out).par_for_each(|(i, j), v| {
                let p1 = (i as f64 + 0.5) * pixel1 - self.params.poni1;
                let p2 = (j as f64 + 0.5) * pixel2 - self.params.poni2;
                let cos_incidence = l / (p1 * p1 + p2 * p2 + l * l).sqrt();
                *v = cos_incidence.powi(3);
            });
            out
        })
    }

    /// Per-pixel polarization factor ½·(1 + cos²2θ − P·cos(2χ)·sin²2θ)
    pub fn polarization_array(
        &self,
        shape: (usize, usize),
        supersampling: usize,
        factor: f64,
    ) -> Arc<Array2<f64>> {
        let tth = self.tth_array(shape, supersampling);
        let chi = self.chi_array(shape, supersampling);
        self.cached(ArrayKind::Polarization(factor.to_bits()), shape, supersampling, || {
            let mut out = Array2::<f64>::zeros(shape);
            Zip::from(&mut out)
                .and(tth.as_ref())
                .and(chi.as_ref())
                .par_for_each(|v, &t, &c| *v = polarization(t, c, factor));
            out
        })
    }
}

/// Polarization factor of a single pixel
pub fn polarization(tth: f64, chi: f64, factor: f64) -> f64 {
    let cos2 = tth.cos().powi(2);
    let sin2 = tth.sin().powi(2);
    0.5 * (1.0 + cos2 - factor * (2.0 * chi).cos() * sin2)
}

pub(crate) fn rotation_matrix(params: &GeometryParameters) -> [[f64; 3]; 3] {
    let (s1, c1) = params.rot1.sin_cos();
    let (s2, c2) = params.rot2.sin_cos();
    let (s3, c3) = params.rot3.sin_cos();
    [
        [c2 * c3, c3 * s1 * s2 - c1 * s3, -(c1 * c3 * s2 + s1 * s3)],
        [c2 * s3, c1 * c3 + s1 * s2 * s3, -(-c3 * s1 + c1 * s2 * s3)],
        [s2, -c2 * s1, c1 * c2],
    ]
}

pub(crate) fn tth_chi(
    params: &GeometryParameters,
    m: &[[f64; 3]; 3],
    row: f64,
    col: f64,
    supersampling: usize,
) -> (f64, f64) {
    let (pixel1, pixel2) = params.pixel_size(supersampling);
    let p1 = (row + 0.5) * pixel1 - params.poni1;
    let p2 = (col + 0.5) * pixel2 - params.poni2;
    let l = params.distance;
    let t1 = m[0][0] * p1 + m[0][1] * p2 + m[0][2] * l;
    let t2 = m[1][0] * p1 + m[1][1] * p2 + m[1][2] * l;
    let t3 = m[2][0] * p1 + m[2][1] * p2 + m[2][2] * l;
    ((t1 * t1 + t2 * t2).sqrt().atan2(t3), t1.atan2(t2))
}

fn det3(a: &[[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1]) - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tilted() -> Geometry {
        Geometry::new(GeometryParameters {
            distance: 0.15,
            poni1: 0.04,
            poni2: 0.035,
            rot1: 0.02,
            rot2: -0.015,
            rot3: 0.3,
            pixel1: 100e-6,
            pixel2: 100e-6,
            wavelength: 0.31e-10,
            polarization_factor: 0.99,
        })
    }

    #[test]
    fn test_poni_pixel_is_at_zero_angle() {
        let geometry = Geometry::new(GeometryParameters {
            poni1: 0.05,
            poni2: 0.05,
            pixel1: 100e-6,
            pixel2: 100e-6,
            ..Default::default()
        });
        let (tth, _) = geometry.tth_chi_at(499.5, 499.5, 1);
        assert!(tth.abs() < 1e-12);
    }

    #[test]
    fn test_untilted_two_theta_is_atan_of_radius() {
        let geometry = Geometry::new(GeometryParameters {
            distance: 0.1,
            poni1: 0.0,
            poni2: 0.0,
            pixel1: 100e-6,
            pixel2: 100e-6,
            ..Default::default()
        });
        let (tth, _) = geometry.tth_chi_at(99.5, -0.5, 1);
        assert_relative_eq!(tth, (0.01f64 / 0.1).atan(), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_projection_round_trip() {
        let geometry = tilted();
        for &(tth_deg, chi_deg) in &[(5.0, 10.0), (12.0, -170.0), (20.0, 95.0)] {
            let tth = f64::to_radians(tth_deg);
            let chi = f64::to_radians(chi_deg);
            let (row, col) = geometry.pixel_for(tth, chi, 1).unwrap();
            let (t, c) = geometry.tth_chi_at(row, col, 1);
            assert_relative_eq!(t, tth, epsilon = 1e-10);
            assert_relative_eq!(c, chi, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_supersampling_keeps_physical_positions() {
        let geometry = tilted();
        let (t1, _) = geometry.tth_chi_at(10.0, 20.0, 1);
        // Pixel (10, 20) at s = 1 covers (20..22, 40..42) at s = 2; its center is at 20.5, 40.5
        let (t2, _) = geometry.tth_chi_at(20.5, 40.5, 2);
        assert_relative_eq!(t1, t2, epsilon = 1e-12);
    }

    #[test]
    fn test_arrays_are_cached_and_invalidated() {
        let mut geometry = tilted();
        let a = geometry.tth_array((8, 6), 1);
        let b = geometry.tth_array((8, 6), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dim(), (8, 6));

        let mut params = *geometry.parameters();
        params.distance = 0.2;
        geometry.set_parameters(params).unwrap();
        let c = geometry.tth_array((8, 6), 1);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_polarization_limits() {
        // Forward scattering is unpolarized
        assert_relative_eq!(polarization(0.0, 0.3, 0.99), 1.0, epsilon = 1e-12);
        // At 2θ = 90° along χ = 0 a fully polarized beam gives zero
        assert_relative_eq!(polarization(PI / 2.0, 0.0, 1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ring_points_stay_on_ring() {
        let geometry = tilted();
        let tth = 8f64.to_radians();
        let points = geometry.ring_points(tth, 72, (800, 800), 1);
        assert!(!points.is_empty());
        for (row, col) in points {
            let (t, _) = geometry.tth_chi_at(row, col, 1);
            assert_relative_eq!(t, tth, epsilon = 1e-10);
        }
    }
}
