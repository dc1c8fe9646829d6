/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! 1D azimuthal integration
//!
//! Pixels are histogrammed by their radial coordinate into equal-width bins.
//! Bin b accumulates w_b = Σ c and s_b = Σ I·c/P over unmasked finite pixels,
//! where c is the solid angle (or one) and P the polarization factor; the
//! pattern value is s_b / w_b and empty bins are dropped.

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::{IntegrationError, Result};
use super::options::IntegrationOptions;
use crate::geometry::{Geometry, Unit};

/// Result of a 1D integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedPattern {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Number of pixels contributing to each returned bin
    pub pixel_counts: Vec<usize>,
    pub unit: Unit,
}

impl IntegratedPattern {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Per-pixel arrays the binning loops read from
pub(crate) struct PixelArrays {
    pub radial: Arc<ndarray::Array2<f64>>,
    pub chi: Option<Arc<ndarray::Array2<f64>>>,
    pub weight: Option<Arc<ndarray::Array2<f64>>>,
    pub polarization: Option<Arc<ndarray::Array2<f64>>>,
}

impl PixelArrays {
    pub(crate) fn new(
        geometry: &Geometry,
        unit: Unit,
        shape: (usize, usize),
        options: &IntegrationOptions,
        need_chi: bool,
    ) -> Self {
        let s = options.supersampling.max(1);
        let polarization = options.polarization_correction.then(|| {
            geometry.polarization_array(shape, s, geometry.parameters().polarization_factor)
        });
        Self {
            radial: geometry.radial_array(unit, shape, s),
            chi: (need_chi || options.azimuth_range.is_some()).then(|| geometry.chi_array(shape, s)),
            weight: options
                .solid_angle_correction
                .then(|| geometry.solid_angle_array(shape, s)),
            polarization,
        }
    }

    /// Weighted contribution (c, I·c/P) of a pixel
    #[inline]
    pub(crate) fn contribution(&self, i: usize, j: usize, intensity: f64) -> (f64, f64) {
        let c = self.weight.as_ref().map_or(1.0, |w| w[[i, j]]);
        let p = self.polarization.as_ref().map_or(1.0, |p| p[[i, j]]);
        (c, intensity * c / p)
    }
}

/// Whether pixel (i, j) takes part in the integration
#[inline]
pub(crate) fn pixel_is_valid(
    image: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    arrays: &PixelArrays,
    azimuth_range: Option<(f64, f64)>,
    i: usize,
    j: usize,
) -> bool {
    if mask.is_some_and(|m| m[[i, j]]) {
        return false;
    }
    if !image[[i, j]].is_finite() || !arrays.radial[[i, j]].is_finite() {
        return false;
    }
    match (azimuth_range, arrays.chi.as_ref()) {
        (Some((lo, hi)), Some(chi)) => {
            let c = chi[[i, j]].to_degrees();
            c >= lo && c <= hi
        }
        _ => true,
    }
}

pub(crate) fn check_shapes(image: &ArrayView2<f32>, mask: Option<&ArrayView2<bool>>) -> Result<()> {
    if let Some(mask) = mask {
        if mask.dim() != image.dim() {
            return Err(IntegrationError::ShapeMismatch {
                expected: image.dim(),
                found: mask.dim(),
            });
        }
    }
    Ok(())
}

/// Min and max of the radial coordinate over valid pixels
pub(crate) fn radial_extent(
    image: &ArrayView2<f32>,
    mask: Option<&ArrayView2<bool>>,
    arrays: &PixelArrays,
    azimuth_range: Option<(f64, f64)>,
) -> Option<(f64, f64)> {
    let (lo, hi) = (0..image.nrows())
        .into_par_iter()
        .map(|i| {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for j in 0..image.ncols() {
                if pixel_is_valid(image, mask, arrays, azimuth_range, i, j) {
                    let r = arrays.radial[[i, j]];
                    lo = lo.min(r);
                    hi = hi.max(r);
                }
            }
            (lo, hi)
        })
        .reduce(
            || (f64::INFINITY, f64::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        );
    (lo <= hi).then_some((lo, hi))
}

/// Bin index of `value` in `bins` equal bins over [lo, hi], clamping `hi` into the last bin
#[inline]
pub(crate) fn bin_index(value: f64, lo: f64, width: f64, bins: usize) -> Option<usize> {
    if value < lo {
        return None;
    }
    let b = ((value - lo) / width) as usize;
    if b < bins {
        Some(b)
    } else if value <= lo + width * bins as f64 * (1.0 + 1e-12) {
        Some(bins - 1)
    } else {
        None
    }
}

#[derive(Clone)]
struct Accumulator {
    weight: Vec<f64>,
    signal: Vec<f64>,
    count: Vec<usize>,
}

impl Accumulator {
    fn new(bins: usize) -> Self {
        Self {
            weight: vec![0.0; bins],
            signal: vec![0.0; bins],
            count: vec![0; bins],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for b in 0..self.weight.len() {
            self.weight[b] += other.weight[b];
            self.signal[b] += other.signal[b];
            self.count[b] += other.count[b];
        }
        self
    }
}

/// Integrate an image into a 1D pattern
///
/// # Arguments
///
/// * `image` - Intensities, already supersampled by `options.supersampling`
/// * `mask` - Optional mask of the same shape; `true` excludes a pixel
/// * `geometry` - Detector geometry
/// * `options` - Unit, bin count, ranges and corrections
///
/// # Returns
///
/// The pattern with empty bins removed, or `EmptyIntegration` when no pixel
/// contributes.
pub fn integrate_1d(
    image: ArrayView2<f32>,
    mask: Option<ArrayView2<bool>>,
    geometry: &Geometry,
    options: &IntegrationOptions,
) -> Result<IntegratedPattern> {
    options.validate()?;
    let mask = mask.as_ref();
    check_shapes(&image, mask)?;

    let shape = image.dim();
    let bins = options.bins_for(shape);
    let arrays = PixelArrays::new(geometry, options.unit, shape, options, false);
    let azimuth_range = options.azimuth_range;

    let (lo, hi) = match options.radial_range {
        Some(range) => range,
        None => radial_extent(&image, mask, &arrays, azimuth_range).ok_or(IntegrationError::EmptyIntegration)?,
    };
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let acc = image
        .axis_iter(Axis(0))
        .into_par_iter()
        .enumerate()
        .fold(
            || Accumulator::new(bins),
            |mut acc, (i, row)| {
                for (j, &value) in row.iter().enumerate() {
                    if !pixel_is_valid(&image, mask, &arrays, azimuth_range, i, j) {
                        continue;
                    }
                    let Some(b) = bin_index(arrays.radial[[i, j]], lo, width, bins) else {
                        continue;
                    };
                    let (c, s) = arrays.contribution(i, j, value as f64);
                    acc.weight[b] += c;
                    acc.signal[b] += s;
                    acc.count[b] += 1;
                }
                acc
            },
        )
        .reduce(|| Accumulator::new(bins), Accumulator::merge);

    let mut pattern = IntegratedPattern {
        x: Vec::with_capacity(bins),
        y: Vec::with_capacity(bins),
        pixel_counts: Vec::with_capacity(bins),
        unit: options.unit,
    };
    for b in 0..bins {
        if acc.weight[b] > 0.0 {
            pattern.x.push(lo + (b as f64 + 0.5) * width);
            pattern.y.push(acc.signal[b] / acc.weight[b]);
            pattern.pixel_counts.push(acc.count[b]);
        }
    }
    if pattern.is_empty() {
        return Err(IntegrationError::EmptyIntegration);
    }
    log::debug!(
        "integrated {:?} image into {} of {} bins ({})",
        shape,
        pattern.len(),
        bins,
        options.unit.label()
    );
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryParameters;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn centered_geometry(n: usize) -> Geometry {
        Geometry::new(GeometryParameters {
            distance: 0.1,
            poni1: n as f64 * 100e-6 / 2.0,
            poni2: n as f64 * 100e-6 / 2.0,
            pixel1: 100e-6,
            pixel2: 100e-6,
            ..Default::default()
        })
    }

    fn plain_options() -> IntegrationOptions {
        IntegrationOptions {
            polarization_correction: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_image_gives_flat_pattern() {
        let image = Array2::<f32>::from_elem((64, 64), 3.0);
        let pattern = integrate_1d(image.view(), None, &centered_geometry(64), &plain_options()).unwrap();
        assert!(!pattern.is_empty());
        for y in &pattern.y {
            assert_relative_eq!(*y, 3.0, epsilon = 1e-12);
        }
        let total: usize = pattern.pixel_counts.iter().sum();
        assert_eq!(total, 64 * 64);
    }

    #[test]
    fn test_nan_pixels_are_masked() {
        let mut image = Array2::<f32>::from_elem((32, 32), 1.0);
        image[[3, 4]] = f32::NAN;
        image[[10, 10]] = f32::INFINITY;
        let pattern = integrate_1d(image.view(), None, &centered_geometry(32), &plain_options()).unwrap();
        let total: usize = pattern.pixel_counts.iter().sum();
        assert_eq!(total, 32 * 32 - 2);
    }

    #[test]
    fn test_fully_masked_is_empty() {
        let image = Array2::<f32>::ones((16, 16));
        let mask = Array2::from_elem((16, 16), true);
        let err = integrate_1d(image.view(), Some(mask.view()), &centered_geometry(16), &plain_options());
        assert!(matches!(err, Err(IntegrationError::EmptyIntegration)));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let image = Array2::<f32>::ones((16, 16));
        let mask = Array2::from_elem((8, 16), false);
        let err = integrate_1d(image.view(), Some(mask.view()), &centered_geometry(16), &plain_options());
        assert!(matches!(err, Err(IntegrationError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_radial_range_and_bins() {
        let image = Array2::<f32>::ones((64, 64));
        let options = IntegrationOptions {
            bins: Some(10),
            radial_range: Some((0.5, 1.5)),
            ..plain_options()
        };
        let pattern = integrate_1d(image.view(), None, &centered_geometry(64), &options).unwrap();
        assert_eq!(pattern.len(), 10);
        assert_relative_eq!(pattern.x[0], 0.55, epsilon = 1e-12);
        assert_relative_eq!(pattern.x[9], 1.45, epsilon = 1e-12);
    }

    #[test]
    fn test_bin_index_clamps_upper_edge() {
        assert_eq!(bin_index(1.0, 0.0, 0.1, 10), Some(9));
        assert_eq!(bin_index(-0.1, 0.0, 0.1, 10), None);
        assert_eq!(bin_index(1.5, 0.0, 0.1, 10), None);
    }
}
