/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Multiplicative intensity corrections
//!
//! A correction is a named non-negative factor array with the shape of the
//! (supersampled) image. The set keeps insertion order and its effective map
//! is the elementwise product of all members.

use ndarray::{Array2, Zip};

use super::errors::{ImageError, Result};

/// Name used for the flat-field correction
pub const FLAT_FIELD: &str = "flat_field";
/// Name used for the oblique detector absorption correction
pub const DETECTOR_ABSORPTION: &str = "detector_absorption";
/// Name used for the diamond-anvil seat absorption correction
pub const SEAT_ABSORPTION: &str = "seat_absorption";

/// A named factor array
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub name: String,
    pub factors: Array2<f32>,
}

/// Ordered set of corrections keyed by name
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    items: Vec<Correction>,
}

impl CorrectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Correction> {
        self.items.iter().find(|c| c.name == name)
    }

    /// Insert or replace a correction
    ///
    /// Negative or infinite factors are rejected; NaN marks a pixel as unusable.
    pub fn add(&mut self, name: &str, factors: Array2<f32>) -> Result<()> {
        if factors.iter().any(|&v| v < 0.0 || v.is_infinite()) {
            return Err(ImageError::FormatError(format!(
                "correction '{}' contains negative or infinite factors",
                name
            )));
        }
        let others = self.items.iter().find(|c| c.name != name).map(|c| c.factors.dim());
        if let Some(shape) = others {
            if shape != factors.dim() {
                return Err(ImageError::ShapeMismatch {
                    expected: shape,
                    found: factors.dim(),
                });
            }
        }
        let correction = Correction {
            name: name.to_string(),
            factors,
        };
        match self.items.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = correction,
            None => self.items.push(correction),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Correction> {
        let index = self.items.iter().position(|c| c.name == name)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every correction whose shape differs from `shape`, returning their names
    pub fn retain_shape(&mut self, shape: (usize, usize)) -> Vec<String> {
        let mut removed = Vec::new();
        self.items.retain(|c| {
            if c.factors.dim() == shape {
                true
            } else {
                log::warn!(
                    "correction '{}' has shape {:?}, image has {:?}; removing it",
                    c.name,
                    c.factors.dim(),
                    shape
                );
                removed.push(c.name.clone());
                false
            }
        });
        removed
    }

    /// Elementwise product of all corrections, `None` when the set is empty
    pub fn product(&self) -> Option<Array2<f32>> {
        let mut iter = self.items.iter();
        let mut out = iter.next()?.factors.clone();
        for c in iter {
            Zip::from(&mut out).and(&c.factors).for_each(|o, &f| *o *= f);
        }
        Some(out)
    }

    /// Multiply `image` by the effective correction map in place
    pub fn apply(&self, image: &mut Array2<f32>) -> Result<()> {
        let Some(map) = self.product() else {
            return Ok(());
        };
        if map.dim() != image.dim() {
            return Err(ImageError::ShapeMismatch {
                expected: image.dim(),
                found: map.dim(),
            });
        }
        Zip::from(image).and(&map).for_each(|v, &c| *v *= c);
        Ok(())
    }
}

/// Flat-field factors mean(F)/F; pixels with F ≤ 0 become NaN
pub fn flat_field(flat: &Array2<f32>) -> Result<Array2<f32>> {
    let (sum, n) = flat
        .iter()
        .filter(|v| v.is_finite() && **v > 0.0)
        .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
    if n == 0 {
        return Err(ImageError::FormatError("flat field has no positive pixel".to_string()));
    }
    let mean = (sum / n as f64) as f32;
    Ok(flat.mapv(|v| if v.is_finite() && v > 0.0 { mean / v } else { f32::NAN }))
}

/// Oblique-incidence detector absorption (1 − e^{−μt}) / (1 − e^{−μt/cos2θ})
///
/// `tth` is the per-pixel 2θ in radians, `mu_t` the product of the linear
/// attenuation coefficient and the sensor thickness.
pub fn detector_absorption(tth: &Array2<f64>, mu_t: f64) -> Array2<f32> {
    let normal = 1.0 - (-mu_t).exp();
    tth.mapv(|t| {
        let path = mu_t / t.cos();
        let oblique = 1.0 - (-path).exp();
        if oblique > 0.0 {
            (normal / oblique) as f32
        } else {
            1.0
        }
    })
}

/// Seat (slab) absorption e^{μt(1/cos2θ − 1)}
pub fn seat_absorption(tth: &Array2<f64>, mu_t: f64) -> Array2<f32> {
    tth.mapv(|t| (mu_t * (1.0 / t.cos() - 1.0)).exp() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_product_of_corrections() {
        let mut set = CorrectionSet::new();
        set.add("a", array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        set.add("b", array![[2.0, 2.0], [0.5, 0.0]]).unwrap();
        assert_eq!(set.product().unwrap(), array![[2.0, 4.0], [1.5, 0.0]]);
        set.add("a", array![[1.0, 1.0], [1.0, 1.0]]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_negative_and_mismatched() {
        let mut set = CorrectionSet::new();
        assert!(set.add("neg", array![[-1.0f32]]).is_err());
        set.add("a", Array2::ones((2, 2))).unwrap();
        assert!(matches!(
            set.add("b", Array2::ones((3, 2))),
            Err(ImageError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_retain_shape() {
        let mut set = CorrectionSet::new();
        set.add("a", Array2::ones((2, 2))).unwrap();
        assert_eq!(set.retain_shape((4, 4)), vec!["a".to_string()]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_flat_field() {
        let flat = array![[1.0f32, 3.0], [2.0, 0.0]];
        let f = flat_field(&flat).unwrap();
        assert_relative_eq!(f[[0, 0]], 2.0);
        assert_relative_eq!(f[[0, 1]], 2.0 / 3.0);
        assert!(f[[1, 1]].is_nan());
    }

    #[test]
    fn test_absorption_is_one_at_normal_incidence() {
        let tth = array![[0.0, 0.5]];
        let d = detector_absorption(&tth, 0.8);
        let s = seat_absorption(&tth, 0.8);
        assert_relative_eq!(d[[0, 0]], 1.0, epsilon = 1e-6);
        assert_relative_eq!(s[[0, 0]], 1.0, epsilon = 1e-6);
        assert!(d[[0, 1]] < 1.0);
        assert!(s[[0, 1]] > 1.0);
    }
}
