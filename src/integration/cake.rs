/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! 2D azimuthal integration ("cake")

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use super::errors::{IntegrationError, Result};
use super::options::IntegrationOptions;
use super::radial::{bin_index, check_shapes, pixel_is_valid, radial_extent, PixelArrays};
use crate::geometry::{Geometry, Unit};

/// Polar-unwarped image with its axes
#[derive(Debug, Clone)]
pub struct Cake {
    /// Intensity of shape (radial bins, azimuth bins); empty bins hold 0
    pub intensity: Array2<f64>,
    /// Radial bin centers, 2θ in degrees
    pub tth: Vec<f64>,
    /// Azimuth bin centers in degrees, covering [-180, 180)
    pub chi: Vec<f64>,
    /// Pixels per bin
    pub counts: Array2<usize>,
}

/// Integrate an image into a cake
///
/// The weighting is the same as for [`integrate_1d`](super::integrate_1d);
/// the radial axis is always 2θ. Callers pass the native-resolution image with
/// `options.supersampling == 1` to reproduce the classic cake view.
pub fn integrate_2d(
    image: ArrayView2<f32>,
    mask: Option<ArrayView2<bool>>,
    geometry: &Geometry,
    options: &IntegrationOptions,
) -> Result<Cake> {
    options.validate()?;
    let mask = mask.as_ref();
    check_shapes(&image, mask)?;

    let shape = image.dim();
    let n_tth = options.cake_radial_bins;
    let n_chi = options.cake_azimuth_bins;
    let arrays = PixelArrays::new(geometry, Unit::TwoTheta, shape, options, true);
    let azimuth_range = options.azimuth_range;
    let Some(chi) = arrays.chi.clone() else {
        return Err(IntegrationError::InvalidOption("azimuth array unavailable".to_string()));
    };

    let (lo, hi) = match options.radial_range {
        Some(range) => range,
        None => radial_extent(&image, mask, &arrays, azimuth_range).ok_or(IntegrationError::EmptyIntegration)?,
    };
    let width = if hi > lo { (hi - lo) / n_tth as f64 } else { 1.0 };
    let chi_width = 360.0 / n_chi as f64;

    // Per-pixel (cell, weight, signal), kept in row-major order
    let mut entries: Vec<(usize, f64, f64)> = (0..shape.0)
        .into_par_iter()
        .flat_map_iter(|i| {
            let image = &image;
            let arrays = &arrays;
            let chi = &chi;
            (0..shape.1).filter_map(move |j| {
                if !pixel_is_valid(image, mask, arrays, azimuth_range, i, j) {
                    return None;
                }
                let b = bin_index(arrays.radial[[i, j]], lo, width, n_tth)?;
                let chi_deg = chi[[i, j]].to_degrees();
                let a = (((chi_deg + 180.0) / chi_width) as usize).min(n_chi - 1);
                let (c, s) = arrays.contribution(i, j, image[[i, j]] as f64);
                Some((b * n_chi + a, c, s))
            })
        })
        .collect();
    if entries.is_empty() {
        return Err(IntegrationError::EmptyIntegration);
    }
    // Stable, so every cell sums its pixels in a fixed order
    entries.par_sort_by_key(|e| e.0);

    let cells = n_tth * n_chi;
    let mut weight = vec![0.0f64; cells];
    let mut signal = vec![0.0f64; cells];
    let mut count = vec![0usize; cells];
    weight
        .par_chunks_mut(n_chi)
        .zip(signal.par_chunks_mut(n_chi))
        .zip(count.par_chunks_mut(n_chi))
        .enumerate()
        .for_each(|(b, ((w_row, s_row), n_row))| {
            let start = entries.partition_point(|e| e.0 < b * n_chi);
            let end = entries.partition_point(|e| e.0 < (b + 1) * n_chi);
            for &(cell, c, s) in &entries[start..end] {
                let a = cell - b * n_chi;
                w_row[a] += c;
                s_row[a] += s;
                n_row[a] += 1;
            }
        });

    let intensity = Array2::from_shape_fn((n_tth, n_chi), |(b, a)| {
        let k = b * n_chi + a;
        if weight[k] > 0.0 {
            signal[k] / weight[k]
        } else {
            0.0
        }
    });
    let counts = Array2::from_shape_fn((n_tth, n_chi), |(b, a)| count[b * n_chi + a]);

    Ok(Cake {
        intensity,
        tth: (0..n_tth).map(|b| lo + (b as f64 + 0.5) * width).collect(),
        chi: (0..n_chi).map(|a| -180.0 + (a as f64 + 0.5) * chi_width).collect(),
        counts,
    })
}
