/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Cosmic-ray detection by iterative sigma clipping

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters of the cosmic-ray search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosmicOptions {
    /// Threshold in standard deviations above the local mean
    pub sigma: f64,
    /// Half width of the square neighbourhood
    pub half_window: usize,
    /// Iteration cap
    pub max_iterations: usize,
}

impl Default for CosmicOptions {
    fn default() -> Self {
        Self {
            sigma: 5.0,
            half_window: 2,
            max_iterations: 10,
        }
    }
}

/// Pixels flagged as cosmic rays, given the pixels already masked
///
/// A pixel is flagged when it exceeds μ + k·σ of its unmasked neighbourhood
/// (the pixel itself excluded). Flagged pixels are excluded from later
/// neighbourhoods and the search repeats until nothing new is found.
pub fn detect(image: ArrayView2<f32>, existing: ArrayView2<bool>, options: &CosmicOptions) -> Array2<bool> {
    let (h, w) = image.dim();
    let mut excluded = existing.to_owned();
    let mut flagged = Array2::from_elem((h, w), false);
    let r = options.half_window.max(1) as isize;

    for iteration in 0..options.max_iterations {
        let current = excluded.view();
        let mut new_flags = Array2::from_elem((h, w), false);
        new_flags
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                for j in 0..w {
                    if current[[i, j]] || !image[[i, j]].is_finite() {
                        continue;
                    }
                    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
                    for di in -r..=r {
                        for dj in -r..=r {
                            if di == 0 && dj == 0 {
                                continue;
                            }
                            let (ii, jj) = (i as isize + di, j as isize + dj);
                            if ii < 0 || jj < 0 || ii >= h as isize || jj >= w as isize {
                                continue;
                            }
                            let (ii, jj) = (ii as usize, jj as usize);
                            let v = image[[ii, jj]] as f64;
                            if current[[ii, jj]] || !v.is_finite() {
                                continue;
                            }
                            n += 1;
                            sum += v;
                            sum_sq += v * v;
                        }
                    }
                    if n < 2 {
                        continue;
                    }
                    let mean = sum / n as f64;
                    let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
                    let value = image[[i, j]] as f64;
                    if value > mean + options.sigma * variance.sqrt() && value > mean {
                        row[j] = true;
                    }
                }
            });

        let added = new_flags.iter().filter(|&&f| f).count();
        log::debug!("cosmic ray iteration {}: {} new pixels", iteration + 1, added);
        if added == 0 {
            break;
        }
        ndarray::Zip::from(&mut excluded)
            .and(&mut flagged)
            .and(&new_flags)
            .for_each(|e, f, &n| {
                if n {
                    *e = true;
                    *f = true;
                }
            });
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_pixels_are_found() {
        let mut image = Array2::<f32>::from_shape_fn((40, 40), |(i, j)| 100.0 + ((i * 7 + j * 3) % 5) as f32);
        image[[10, 12]] = 5000.0;
        image[[30, 5]] = 8000.0;
        let existing = Array2::from_elem((40, 40), false);
        let flagged = detect(image.view(), existing.view(), &CosmicOptions::default());
        assert!(flagged[[10, 12]]);
        assert!(flagged[[30, 5]]);
        assert_eq!(flagged.iter().filter(|&&f| f).count(), 2);
    }

    #[test]
    fn test_masked_pixels_are_not_flagged() {
        let mut image = Array2::<f32>::from_elem((20, 20), 1.0);
        image[[5, 5]] = 1000.0;
        let mut existing = Array2::from_elem((20, 20), false);
        existing[[5, 5]] = true;
        let flagged = detect(image.view(), existing.view(), &CosmicOptions::default());
        assert!(!flagged.iter().any(|&f| f));
    }
}
