/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Mask module

pub mod cosmic;
pub mod errors;
pub mod io;
pub mod model;
pub mod shapes;

pub use cosmic::CosmicOptions;
pub use errors::{MaskError, Result};
pub use model::MaskModel;
