/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the geometry module

use std::io;
use thiserror::Error;

/// Errors that can occur while handling detector geometry
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid calibration file: {0}")]
    FormatError(String),

    #[error("Invalid geometry parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown calibrant: {0}")]
    UnknownCalibrant(String),

    #[error("Refinement needs at least {required} points, got {found}")]
    TooFewPoints { found: usize, required: usize },

    #[error("Ring {ring} is not among the {rings} calibrant rings reachable at this wavelength")]
    UnknownRing { ring: usize, rings: usize },

    #[error("Refinement Jacobian is rank deficient: {0}")]
    RankDeficient(String),

    #[error("Refinement produced a non-finite residual")]
    NonFinite,

    #[error("Refinement failed to converge after {0} iterations")]
    NotConverged(usize),

    #[error("Refinement was cancelled")]
    Cancelled,
}

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, GeometryError>;
