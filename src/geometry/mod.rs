/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Detector geometry module
//!
//! This module maps detector pixels to scattering angles using a
//! pinhole-plus-tilt projection (PONI convention), converts between 2θ, q
//! and d, computes per-pixel solid-angle and polarization corrections, and
//! refines the geometry against rings picked on a calibrant image.
//!
//! One [`Geometry`] serves every pixel scale: derived arrays are computed
//! lazily per (shape, supersampling) and cached until the parameters change.

pub mod calibrant;
pub mod errors;
pub mod parameters;
pub mod poni;
pub mod projection;
pub mod refinement;

pub use calibrant::Calibrant;
pub use errors::{GeometryError, Result};
pub use parameters::{GeometryParameters, Unit};
pub use projection::Geometry;
pub use refinement::{PickedRingPoints, RefinementOptions, RefinementResult, RingGroup};
