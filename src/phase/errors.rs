/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the phase module

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid phase file: {0}")]
    FormatError(String),

    #[error("Unknown crystal system: {0}")]
    UnknownSymmetry(String),

    #[error("Invalid symmetry operation: {0}")]
    InvalidSymmetryOperation(String),

    #[error("Equation of state could not be solved: {0}")]
    EosSolve(String),

    #[error("Invalid phase parameter: {0}")]
    InvalidParameter(String),

    #[error("No phase at index {0}")]
    NoSuchPhase(usize),
}

pub type Result<T> = std::result::Result<T, PhaseError>;
