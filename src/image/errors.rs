/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the image module

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TIFF error: {0}")]
    TiffError(#[from] tiff::TiffError),

    #[error("Invalid image file: {0}")]
    FormatError(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Frame {index} out of range for a series of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Shape {found:?} does not match image shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("No image loaded")]
    NoImage,

    #[error("Directory watcher failed: {0}")]
    Watcher(String),

    #[error("Image loader thread stopped")]
    LoaderStopped,
}

pub type Result<T> = std::result::Result<T, ImageError>;
