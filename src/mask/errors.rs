/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the mask module

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid mask file: {0}")]
    FormatError(String),

    #[error("Mask shape {found:?} does not match image shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid mask parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, MaskError>;
