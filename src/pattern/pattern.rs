/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! A 1D pattern with scaling, offset and background

use serde::{Deserialize, Serialize};

use super::background::{extract_background, AutoBackground};
use super::errors::{PatternError, Result};
use crate::utils::math::interpolate;

/// Tolerance used when clipping a grid to an x range
const RANGE_EPS: f64 = 1e-12;

/// An (x, y) pattern
///
/// The effective data is σ·(y − y_bkg − y_auto) + ο where y_bkg is the
/// attached background pattern interpolated onto this pattern's grid (and the
/// grid clipped to the common range) and y_auto the automatic background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    scaling: f64,
    offset: f64,
    background_pattern: Option<Box<Pattern>>,
    auto_background: Option<AutoBackground>,
    #[serde(skip)]
    auto_background_values: Option<Vec<f64>>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            name: String::new(),
            x: Vec::new(),
            y: Vec::new(),
            scaling: 1.0,
            offset: 0.0,
            background_pattern: None,
            auto_background: None,
            auto_background_values: None,
        }
    }
}

impl Pattern {
    /// Create a pattern; x and y must have equal length
    pub fn new(x: Vec<f64>, y: Vec<f64>, name: &str) -> Result<Self> {
        if x.len() != y.len() {
            return Err(PatternError::LengthMismatch { x: x.len(), y: y.len() });
        }
        Ok(Self {
            name: name.to_string(),
            x,
            y,
            ..Default::default()
        })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_scaling(&mut self, scaling: f64) {
        self.scaling = scaling;
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    /// Smallest and largest x
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let lo = self.x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo <= hi).then_some((lo, hi))
    }

    /// Replace the raw data, keeping background settings
    ///
    /// A background pattern that no longer overlaps is detached and
    /// `BkgNotInRange` returned; the new data is kept either way.
    pub fn set_data(&mut self, x: Vec<f64>, y: Vec<f64>) -> Result<()> {
        if x.len() != y.len() {
            return Err(PatternError::LengthMismatch { x: x.len(), y: y.len() });
        }
        self.x = x;
        self.y = y;
        if let Some(bkg) = &self.background_pattern {
            if self.intersection(bkg).is_none() {
                self.background_pattern = None;
                self.refresh_auto_background()?;
                return Err(PatternError::BkgNotInRange);
            }
        }
        self.refresh_auto_background()
    }

    pub fn background_pattern(&self) -> Option<&Pattern> {
        self.background_pattern.as_deref()
    }

    /// Attach or detach a background pattern
    ///
    /// The background's effective data is captured. On `BkgNotInRange` the
    /// previous background stays in place.
    pub fn set_background_pattern(&mut self, background: Option<Pattern>) -> Result<()> {
        let previous = self.background_pattern.take();
        if let Some(bkg) = background {
            let (bx, by) = bkg.data();
            let snapshot = Pattern::new(bx, by, &bkg.name)?;
            if self.intersection(&snapshot).is_none() {
                self.background_pattern = previous;
                return Err(PatternError::BkgNotInRange);
            }
            self.background_pattern = Some(Box::new(snapshot));
        }
        if let Err(e) = self.refresh_auto_background() {
            log::warn!("automatic background failed: {}", e);
        }
        Ok(())
    }

    pub fn auto_background(&self) -> Option<&AutoBackground> {
        self.auto_background.as_ref()
    }

    /// Automatic background values on the background-clipped grid
    pub fn auto_background_values(&self) -> Option<&[f64]> {
        self.auto_background_values.as_deref()
    }

    /// Enable, change or disable the automatic background
    ///
    /// On failure the previous settings are kept.
    pub fn set_auto_background(&mut self, params: Option<AutoBackground>) -> Result<()> {
        let previous = (self.auto_background, self.auto_background_values.take());
        self.auto_background = params;
        if let Err(e) = self.refresh_auto_background() {
            self.auto_background = previous.0;
            self.auto_background_values = previous.1;
            return Err(e);
        }
        Ok(())
    }

    fn refresh_auto_background(&mut self) -> Result<()> {
        self.auto_background_values = None;
        let Some(params) = self.auto_background else {
            return Ok(());
        };
        let (x, y) = self.background_subtracted();
        if x.len() < 2 {
            return Ok(());
        }
        self.auto_background_values = Some(extract_background(&x, &y, &params)?);
        Ok(())
    }

    /// Common x range with `other`, `None` when they do not overlap on this grid
    fn intersection(&self, other: &Pattern) -> Option<(f64, f64)> {
        let (a0, a1) = self.x_range()?;
        let (b0, b1) = other.x_range()?;
        let (lo, hi) = (a0.max(b0), a1.min(b1));
        if lo > hi {
            return None;
        }
        self.x
            .iter()
            .any(|&v| v >= lo - RANGE_EPS && v <= hi + RANGE_EPS)
            .then_some((lo, hi))
    }

    /// Raw data minus the background pattern, clipped to the common range
    fn background_subtracted(&self) -> (Vec<f64>, Vec<f64>) {
        let Some(bkg) = &self.background_pattern else {
            return (self.x.clone(), self.y.clone());
        };
        let Some((lo, hi)) = self.intersection(bkg) else {
            return (Vec::new(), Vec::new());
        };
        let (x, y): (Vec<f64>, Vec<f64>) = self
            .x
            .iter()
            .zip(&self.y)
            .filter(|(&xv, _)| xv >= lo - RANGE_EPS && xv <= hi + RANGE_EPS)
            .map(|(&xv, &yv)| (xv, yv))
            .unzip();
        match interpolate(&x, &bkg.x, &bkg.y) {
            Ok(by) => {
                let y = y.iter().zip(&by).map(|(a, b)| a - b).collect();
                (x, y)
            }
            Err(e) => {
                log::warn!("background interpolation failed: {}", e);
                (x, y)
            }
        }
    }

    /// Effective (x, y)
    pub fn data(&self) -> (Vec<f64>, Vec<f64>) {
        let (x, mut y) = self.background_subtracted();
        if let Some(auto) = &self.auto_background_values {
            if auto.len() == y.len() {
                for (v, b) in y.iter_mut().zip(auto) {
                    *v -= b;
                }
            }
        }
        for v in y.iter_mut() {
            *v = self.scaling * *v + self.offset;
        }
        (x, y)
    }

    /// Copy restricted to x ∈ [xmin, xmax]
    pub fn limit(&self, xmin: f64, xmax: f64) -> Pattern {
        let (x, y): (Vec<f64>, Vec<f64>) = self
            .x
            .iter()
            .zip(&self.y)
            .filter(|(&xv, _)| xv >= xmin && xv <= xmax)
            .map(|(&xv, &yv)| (xv, yv))
            .unzip();
        Pattern {
            name: self.name.clone(),
            x,
            y,
            scaling: self.scaling,
            offset: self.offset,
            ..Default::default()
        }
    }

    /// Effective data of `self` plus that of `other`
    pub fn add(&self, other: &Pattern) -> Result<Pattern> {
        self.combine(other, 1.0)
    }

    /// Effective data of `self` minus that of `other`
    pub fn subtract(&self, other: &Pattern) -> Result<Pattern> {
        self.combine(other, -1.0)
    }

    /// Combine on the grid of whichever operand spans the longer range,
    /// restricted to the common range
    fn combine(&self, other: &Pattern, sign: f64) -> Result<Pattern> {
        let (ax, ay) = self.data();
        let (bx, by) = other.data();
        let a = Pattern::new(ax, ay, &self.name)?;
        let b = Pattern::new(bx, by, &other.name)?;
        let (a0, a1) = a.x_range().ok_or(PatternError::BkgNotInRange)?;
        let (b0, b1) = b.x_range().ok_or(PatternError::BkgNotInRange)?;
        let (lo, hi) = (a0.max(b0), a1.min(b1));
        if lo > hi {
            return Err(PatternError::BkgNotInRange);
        }
        let grid_source = if (b1 - b0) > (a1 - a0) { &b } else { &a };
        let grid: Vec<f64> = grid_source
            .x
            .iter()
            .copied()
            .filter(|&v| v >= lo - RANGE_EPS && v <= hi + RANGE_EPS)
            .collect();
        if grid.is_empty() {
            return Err(PatternError::BkgNotInRange);
        }
        let to_err = |e: crate::utils::UtilsError| PatternError::InvalidParameter(e.to_string());
        let ya = interpolate(&grid, &a.x, &a.y).map_err(to_err)?;
        let yb = interpolate(&grid, &b.x, &b.y).map_err(to_err)?;
        let y = ya.iter().zip(&yb).map(|(p, q)| p + sign * q).collect();
        Pattern::new(grid, y, &self.name)
    }
}
