/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the integration module

use thiserror::Error;

use crate::geometry::GeometryError;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Image shape {found:?} does not match {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("No unmasked finite pixel inside the integration range")]
    EmptyIntegration,

    #[error("Invalid integration option: {0}")]
    InvalidOption(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Integration worker stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, IntegrationError>;
