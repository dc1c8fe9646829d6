/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Image frame with a reversible transform list

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Geometric image transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transform {
    /// Rotate 90° counter-clockwise
    RotateCcw,
    /// Rotate 90° clockwise
    RotateCw,
    /// Mirror left to right
    FlipHorizontal,
    /// Mirror top to bottom
    FlipVertical,
}

impl Transform {
    /// Apply to an array
    pub fn apply<T: Clone>(self, a: &Array2<T>) -> Array2<T> {
        match self {
            Transform::RotateCcw => a.t().slice(s![..;-1, ..]).to_owned(),
            Transform::RotateCw => a.t().slice(s![.., ..;-1]).to_owned(),
            Transform::FlipHorizontal => a.slice(s![.., ..;-1]).to_owned(),
            Transform::FlipVertical => a.slice(s![..;-1, ..]).to_owned(),
        }
    }

    /// Transform that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Transform::RotateCcw => Transform::RotateCw,
            Transform::RotateCw => Transform::RotateCcw,
            other => other,
        }
    }

    /// Shape after applying to an array of `shape`
    pub fn output_shape(self, shape: (usize, usize)) -> (usize, usize) {
        match self {
            Transform::RotateCcw | Transform::RotateCw => (shape.1, shape.0),
            _ => shape,
        }
    }
}

/// Apply `transforms` in order
pub fn apply_transforms<T: Clone>(a: &Array2<T>, transforms: &[Transform]) -> Array2<T> {
    let mut out = a.clone();
    for t in transforms {
        out = t.apply(&out);
    }
    out
}

/// Replicate each pixel `factor`×`factor` times
pub fn supersample<T: Clone>(a: &Array2<T>, factor: usize) -> Array2<T> {
    if factor <= 1 {
        return a.clone();
    }
    let (h, w) = a.dim();
    Array2::from_shape_fn((h * factor, w * factor), |(i, j)| a[[i / factor, j / factor]].clone())
}

/// A raw frame plus the transforms applied to it
#[derive(Debug, Clone)]
pub struct ImageFrame {
    raw: Array2<f32>,
    data: Array2<f32>,
    transforms: Vec<Transform>,
    path: Option<PathBuf>,
    series_index: usize,
    series_len: usize,
}

impl ImageFrame {
    /// Create a frame from raw data
    pub fn new(raw: Array2<f32>, path: Option<PathBuf>, series_index: usize, series_len: usize) -> Self {
        Self {
            data: raw.clone(),
            raw,
            transforms: Vec::new(),
            path,
            series_index,
            series_len: series_len.max(1),
        }
    }

    /// Create a frame without a source file
    pub fn from_array(raw: Array2<f32>) -> Self {
        Self::new(raw, None, 0, 1)
    }

    /// Pixel data after transforms
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Pixel data as read from the file
    pub fn raw(&self) -> &Array2<f32> {
        &self.raw
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn series_index(&self) -> usize {
        self.series_index
    }

    pub fn series_len(&self) -> usize {
        self.series_len
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Apply a transform and remember it
    pub fn add_transform(&mut self, transform: Transform) {
        self.data = transform.apply(&self.data);
        self.transforms.push(transform);
    }

    /// Undo the most recent transform
    pub fn remove_last_transform(&mut self) -> Option<Transform> {
        let last = self.transforms.pop()?;
        self.data = last.inverse().apply(&self.data);
        Some(last)
    }

    /// Drop all transforms, restoring the raw pixels exactly
    pub fn reset_transforms(&mut self) {
        self.transforms.clear();
        self.data = self.raw.clone();
    }

    /// Replace the transform list, e.g. to carry it over to a new frame
    pub fn set_transforms(&mut self, transforms: &[Transform]) {
        self.transforms = transforms.to_vec();
        self.data = apply_transforms(&self.raw, &self.transforms);
    }
}
