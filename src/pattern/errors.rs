/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the pattern module

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid pattern file: {0}")]
    FormatError(String),

    #[error("x has {x} points but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("Background range does not overlap the pattern")]
    BkgNotInRange,

    #[error("No overlay at index {0}")]
    NoSuchOverlay(usize),

    #[error("Invalid pattern parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, PatternError>;
