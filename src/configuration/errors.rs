/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Error types for the configuration module

use std::io;
use thiserror::Error;

use crate::geometry::GeometryError;
use crate::image::ImageError;
use crate::integration::IntegrationError;
use crate::mask::MaskError;
use crate::pattern::PatternError;
use crate::phase::PhaseError;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid file: {0}")]
    FormatError(String),

    #[error("No configuration at index {0}")]
    NoSuchConfiguration(usize),

    #[error("The last configuration cannot be removed")]
    LastConfiguration,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;
