/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Utility functions for the reduction engine
//!
//! This module provides the unit conversions, interpolation, orthogonal
//! polynomial fitting and small dense solvers shared by the geometry,
//! integration, pattern and phase modules.

pub mod constants;
pub mod conversions;
pub mod errors;
pub mod linear_algebra;
pub mod math;

pub use conversions::*;
pub use errors::{Result, UtilsError};
