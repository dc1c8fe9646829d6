/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Automatic background: Bruckner smoothing followed by a Legendre fit

use serde::{Deserialize, Serialize};

use super::errors::{PatternError, Result};
use crate::utils::math::{legendre_evaluate, legendre_fit, mean};

/// Parameters of the automatic background
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoBackground {
    /// Smoothing half window in x units
    pub smooth_width: f64,
    /// Number of smoothing passes
    pub iterations: usize,
    /// Degree of the Legendre series
    pub poly_order: usize,
    /// Restrict the extraction to [xmin, xmax]
    pub roi: Option<(f64, f64)>,
}

impl Default for AutoBackground {
    fn default() -> Self {
        Self {
            smooth_width: 0.1,
            iterations: 50,
            poly_order: 50,
            roi: None,
        }
    }
}

/// Iterative floor-of-local-mean smoothing
///
/// `half_window` is m = round(w/Δx). The signal is padded with its end
/// values, capped at ȳ + 2(ȳ − y_min), and every pass replaces each interior
/// value by the mean of its 2m+1 window when that mean is lower.
pub fn bruckner_smooth(y: &[f64], half_window: usize, iterations: usize) -> Vec<f64> {
    let len = y.len();
    if len == 0 {
        return Vec::new();
    }
    let m = half_window;
    let mut padded = Vec::with_capacity(len + 2 * m);
    padded.extend(std::iter::repeat(y[0]).take(m));
    padded.extend_from_slice(y);
    padded.extend(std::iter::repeat(y[len - 1]).take(m));

    let y_mean = mean(&padded);
    let min = padded.iter().copied().fold(f64::INFINITY, f64::min);
    let cap = y_mean + 2.0 * (y_mean - min);
    for v in padded.iter_mut() {
        *v = v.min(cap);
    }

    let window = (2 * m + 1) as f64;
    let mut next = padded.clone();
    for _ in 0..iterations {
        let mut sum: f64 = padded[..=2 * m].iter().sum();
        for i in m..(len + m) {
            let average = sum / window;
            next[i] = if average < padded[i] { average } else { padded[i] };
            if i + m + 1 < padded.len() {
                sum += padded[i + m + 1] - padded[i - m];
            }
        }
        std::mem::swap(&mut padded, &mut next);
    }
    padded[m..len + m].to_vec()
}

/// Background of `y` sampled on the equally spaced grid `x`
///
/// # Returns
///
/// A vector on the original grid; zero outside the ROI when one is given.
pub fn extract_background(x: &[f64], y: &[f64], params: &AutoBackground) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        return Err(PatternError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if params.smooth_width.is_nan() || params.smooth_width <= 0.0 {
        return Err(PatternError::InvalidParameter(format!(
            "smoothing width must be positive, got {}",
            params.smooth_width
        )));
    }

    let (start, end) = match params.roi {
        Some((lo, hi)) => {
            let (lo, hi) = (lo.min(hi), lo.max(hi));
            let start = x.iter().position(|&v| v >= lo).unwrap_or(x.len());
            let end = x.iter().rposition(|&v| v <= hi).map_or(0, |k| k + 1);
            (start, end.max(start))
        }
        None => (0, x.len()),
    };
    let xs = &x[start..end];
    let ys = &y[start..end];
    if xs.len() < 2 {
        return Err(PatternError::InvalidParameter(
            "background region needs at least two points".to_string(),
        ));
    }

    let step = ((xs[xs.len() - 1] - xs[0]) / (xs.len() - 1) as f64).abs();
    let half_window = if step > 0.0 {
        (params.smooth_width / step).round() as usize
    } else {
        0
    };
    let smoothed = bruckner_smooth(ys, half_window, params.iterations);

    let (a, b) = (xs[0], xs[xs.len() - 1]);
    let u: Vec<f64> = xs.iter().map(|&v| 2.0 * (v - a) / (b - a) - 1.0).collect();
    let degree = params.poly_order.min(xs.len() - 1);
    let coeffs = legendre_fit(&u, &smoothed, degree)
        .map_err(|e| PatternError::InvalidParameter(format!("background fit failed: {}", e)))?;

    let mut background = vec![0.0; x.len()];
    for (k, &uk) in u.iter().enumerate() {
        background[start + k] = legendre_evaluate(uk, &coeffs);
    }
    Ok(background)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_smoothing_removes_spike() {
        let mut y = vec![1.0; 101];
        y[50] = 100.0;
        let smoothed = bruckner_smooth(&y, 5, 20);
        assert!(smoothed[50] < 1.5);
        assert_relative_eq!(smoothed[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_smoothing_never_raises_values() {
        let y: Vec<f64> = (0..200).map(|i| ((i as f64) * 0.3).sin() + 2.0).collect();
        let smoothed = bruckner_smooth(&y, 4, 10);
        for (s, v) in smoothed.iter().zip(&y) {
            assert!(*s <= *v + 1e-12);
        }
    }

    #[test]
    fn test_straight_line_is_a_fixed_point() {
        let y: Vec<f64> = (0..500).map(|i| 2.0 + 0.01 * i as f64).collect();
        let smoothed = bruckner_smooth(&y, 5, 5);
        // Only the right end, where the constant padding lies below the line, is lowered
        for k in 0..470 {
            assert_relative_eq!(smoothed[k], y[k], epsilon = 1e-9);
        }
        assert!(smoothed[499] < y[499]);
    }

    #[test]
    fn test_roi_zeroes_outside() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y = vec![3.0; 100];
        let params = AutoBackground {
            smooth_width: 2.0,
            iterations: 10,
            poly_order: 4,
            roi: Some((20.0, 60.0)),
        };
        let bkg = extract_background(&x, &y, &params).unwrap();
        assert_eq!(bkg[10], 0.0);
        assert_eq!(bkg[70], 0.0);
        assert_relative_eq!(bkg[40], 3.0, epsilon = 1e-10);
        assert_relative_eq!(bkg[20], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_nonpositive_width() {
        let params = AutoBackground {
            smooth_width: 0.0,
            ..Default::default()
        };
        assert!(extract_background(&[0.0, 1.0], &[1.0, 1.0], &params).is_err());
    }
}
