/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Mask state with bounded undo/redo history

use ndarray::{Array2, ArrayView2, Zip};
use std::collections::VecDeque;
use std::path::Path;

use super::cosmic::{self, CosmicOptions};
use super::errors::{MaskError, Result};
use super::{io, shapes};
use crate::utils::constants::HISTORY_DEPTH;

/// A boolean mask where `true` excludes a pixel from integration
#[derive(Debug, Clone)]
pub struct MaskModel {
    mask: Array2<bool>,
    undo: VecDeque<Array2<bool>>,
    redo: VecDeque<Array2<bool>>,
    supersampling: usize,
}

impl Default for MaskModel {
    fn default() -> Self {
        Self::new((0, 0))
    }
}

impl MaskModel {
    /// Create an empty mask of `shape`
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            mask: Array2::from_elem(shape, false),
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            supersampling: 1,
        }
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn view(&self) -> ArrayView2<bool> {
        self.mask.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn supersampling(&self) -> usize {
        self.supersampling
    }

    /// Number of masked pixels
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Record the current state before a mutation
    fn checkpoint(&mut self) {
        if self.undo.len() == HISTORY_DEPTH {
            self.undo.pop_front();
        }
        self.undo.push_back(self.mask.clone());
        self.redo.clear();
    }

    fn apply(&mut self, pixels: &[(usize, usize)], value: bool) {
        self.checkpoint();
        for &(i, j) in pixels {
            self.mask[[i, j]] = value;
        }
    }

    /// Make the mask match `shape`, zeroing it and its history on change
    pub fn ensure_shape(&mut self, shape: (usize, usize), supersampling: usize) -> bool {
        if self.mask.dim() == shape && self.supersampling == supersampling.max(1) {
            return false;
        }
        log::debug!("resetting mask from {:?} to {:?}", self.mask.dim(), shape);
        self.mask = Array2::from_elem(shape, false);
        self.undo.clear();
        self.redo.clear();
        self.supersampling = supersampling.max(1);
        true
    }

    /// Replace the mask wholesale, checking its shape
    pub fn set_mask(&mut self, mask: Array2<bool>) -> Result<()> {
        if mask.dim() != self.mask.dim() {
            return Err(MaskError::ShapeMismatch {
                expected: self.mask.dim(),
                found: mask.dim(),
            });
        }
        self.checkpoint();
        self.mask = mask;
        Ok(())
    }

    pub fn set_pixel(&mut self, row: usize, col: usize) {
        if row < self.mask.nrows() && col < self.mask.ncols() {
            self.apply(&[(row, col)], true);
        }
    }

    pub fn clear_pixel(&mut self, row: usize, col: usize) {
        if row < self.mask.nrows() && col < self.mask.ncols() {
            self.apply(&[(row, col)], false);
        }
    }

    pub fn mask_rectangle(&mut self, corner: (f64, f64), opposite: (f64, f64)) {
        let pixels = shapes::rectangle(self.shape(), corner, opposite);
        self.apply(&pixels, true);
    }

    pub fn remove_rectangle(&mut self, corner: (f64, f64), opposite: (f64, f64)) {
        let pixels = shapes::rectangle(self.shape(), corner, opposite);
        self.apply(&pixels, false);
    }

    pub fn mask_ellipse(&mut self, center: (f64, f64), radii: (f64, f64), angle: f64) {
        let pixels = shapes::ellipse(self.shape(), center, radii, angle);
        self.apply(&pixels, true);
    }

    pub fn remove_ellipse(&mut self, center: (f64, f64), radii: (f64, f64), angle: f64) {
        let pixels = shapes::ellipse(self.shape(), center, radii, angle);
        self.apply(&pixels, false);
    }

    pub fn mask_circle(&mut self, center: (f64, f64), radius: f64) {
        let pixels = shapes::circle(self.shape(), center, radius);
        self.apply(&pixels, true);
    }

    pub fn remove_circle(&mut self, center: (f64, f64), radius: f64) {
        let pixels = shapes::circle(self.shape(), center, radius);
        self.apply(&pixels, false);
    }

    pub fn mask_polygon(&mut self, vertices: &[(f64, f64)]) {
        let pixels = shapes::polygon(self.shape(), vertices);
        self.apply(&pixels, true);
    }

    pub fn remove_polygon(&mut self, vertices: &[(f64, f64)]) {
        let pixels = shapes::polygon(self.shape(), vertices);
        self.apply(&pixels, false);
    }

    fn check_image(&self, image: &ArrayView2<f32>) -> Result<()> {
        if image.dim() != self.mask.dim() {
            return Err(MaskError::ShapeMismatch {
                expected: self.mask.dim(),
                found: image.dim(),
            });
        }
        Ok(())
    }

    /// Mask every pixel with intensity above `threshold`
    pub fn mask_above(&mut self, image: ArrayView2<f32>, threshold: f32) -> Result<()> {
        self.check_image(&image)?;
        self.checkpoint();
        Zip::from(&mut self.mask).and(&image).for_each(|m, &v| {
            if v > threshold {
                *m = true;
            }
        });
        Ok(())
    }

    /// Mask every pixel with intensity below `threshold`
    pub fn mask_below(&mut self, image: ArrayView2<f32>, threshold: f32) -> Result<()> {
        self.check_image(&image)?;
        self.checkpoint();
        Zip::from(&mut self.mask).and(&image).for_each(|m, &v| {
            if v < threshold {
                *m = true;
            }
        });
        Ok(())
    }

    pub fn invert(&mut self) {
        self.checkpoint();
        self.mask.mapv_inplace(|m| !m);
    }

    /// Unmask everything
    pub fn clear(&mut self) {
        self.checkpoint();
        self.mask.fill(false);
    }

    /// Dilate by one pixel in the 8-neighbourhood
    pub fn grow(&mut self) {
        self.checkpoint();
        self.mask = neighbourhood_filter(&self.mask, |any, _| any);
    }

    /// Erode by one pixel in the 8-neighbourhood; pixels outside the frame count as unmasked
    pub fn shrink(&mut self) {
        self.checkpoint();
        self.mask = neighbourhood_filter(&self.mask, |_, all| all);
    }

    /// Mask cosmic rays found by iterative sigma clipping
    pub fn mask_cosmic(&mut self, image: ArrayView2<f32>, options: &CosmicOptions) -> Result<usize> {
        self.check_image(&image)?;
        let flagged = cosmic::detect(image, self.mask.view(), options);
        let found = flagged.iter().filter(|&&f| f).count();
        self.checkpoint();
        Zip::from(&mut self.mask).and(&flagged).for_each(|m, &f| *m |= f);
        log::info!("masked {} cosmic ray pixels", found);
        Ok(found)
    }

    pub fn undo(&mut self) -> bool {
        match self.undo.pop_back() {
            Some(previous) => {
                if self.redo.len() == HISTORY_DEPTH {
                    self.redo.pop_front();
                }
                self.redo.push_back(std::mem::replace(&mut self.mask, previous));
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop_back() {
            Some(next) => {
                if self.undo.len() == HISTORY_DEPTH {
                    self.undo.pop_front();
                }
                self.undo.push_back(std::mem::replace(&mut self.mask, next));
                true
            }
            None => false,
        }
    }

    /// Resample the mask to supersampling factor `factor`
    ///
    /// The mask is first reduced to native resolution by OR over each block,
    /// then every native pixel is replicated `factor`×`factor` times. History
    /// is cleared since it refers to the old shape.
    pub fn set_supersampling(&mut self, factor: usize) {
        let factor = factor.max(1);
        if factor == self.supersampling {
            return;
        }
        let native = downsample(&self.mask, self.supersampling);
        self.mask = upsample(&native, factor);
        self.supersampling = factor;
        self.undo.clear();
        self.redo.clear();
    }

    /// Save to `path` in the packed format
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        io::write_mask(path, &self.mask)
    }

    /// Load from `path`; the stored shape must match the current one
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = io::read_mask(path)?;
        self.set_mask(loaded)
    }

    /// Load a mask saved at native resolution into a supersampled model
    pub fn load_native<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = upsample(&io::read_mask(path)?, self.supersampling);
        self.set_mask(loaded)
    }

    /// The mask at native resolution
    pub fn native(&self) -> Array2<bool> {
        downsample(&self.mask, self.supersampling)
    }
}

/// Apply `rule(any_set, all_set)` to each 3×3 neighbourhood, outside pixels unset
fn neighbourhood_filter<F>(mask: &Array2<bool>, rule: F) -> Array2<bool>
where
    F: Fn(bool, bool) -> bool,
{
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        let mut any = false;
        let mut all = true;
        for di in -1isize..=1 {
            for dj in -1isize..=1 {
                let (ii, jj) = (i as isize + di, j as isize + dj);
                let value = ii >= 0
                    && jj >= 0
                    && ii < h as isize
                    && jj < w as isize
                    && mask[[ii as usize, jj as usize]];
                any |= value;
                all &= value;
            }
        }
        rule(any, all)
    })
}

/// Replicate every pixel `factor`×`factor` times
pub fn upsample(mask: &Array2<bool>, factor: usize) -> Array2<bool> {
    if factor <= 1 {
        return mask.clone();
    }
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h * factor, w * factor), |(i, j)| mask[[i / factor, j / factor]])
}

/// OR-reduce each `factor`×`factor` block
pub fn downsample(mask: &Array2<bool>, factor: usize) -> Array2<bool> {
    if factor <= 1 {
        return mask.clone();
    }
    let (h, w) = mask.dim();
    let (nh, nw) = (h / factor, w / factor);
    Array2::from_shape_fn((nh, nw), |(i, j)| {
        (0..factor).any(|a| (0..factor).any(|b| mask[[i * factor + a, j * factor + b]]))
    })
}
