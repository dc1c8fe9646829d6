/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Pattern module
//!
//! 1D patterns with scaling, offset and background handling, the overlay
//! model, ASCII pattern files and the Bruckner background extractor.

pub mod background;
pub mod errors;
pub mod io;
pub mod model;
#[allow(clippy::module_inception)]
pub mod pattern;

pub use background::{extract_background, AutoBackground};
pub use errors::{PatternError, Result};
pub use model::{Overlay, PatternEvent, PatternModel};
pub use pattern::Pattern;
