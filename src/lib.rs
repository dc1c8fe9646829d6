/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! # dioptas-rs
//!
//! Reduction engine for 2D X-ray diffraction images: detector geometry and
//! calibration, azimuthal integration into 1D patterns and 2D cakes, masks,
//! image corrections, pattern backgrounds and overlays, and crystallographic
//! phases with equations of state.
//!
//! The models are plain data with [`configuration::Signal`] channels for
//! change notifications, so any front end can drive them.

pub mod cli;
pub mod configuration;
pub mod geometry;
pub mod image;
pub mod integration;
pub mod mask;
pub mod pattern;
pub mod phase;
pub mod utils;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

pub use configuration::{Configuration, ConfigurationManager};
pub use geometry::{Geometry, GeometryParameters, Unit};
pub use integration::{integrate_1d, integrate_2d, IntegrationOptions};
pub use pattern::Pattern;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_starts_with_one_configuration() {
        let manager = ConfigurationManager::new();
        assert_eq!(manager.len(), 1);
        assert!(!VERSION.is_empty());
    }
}
