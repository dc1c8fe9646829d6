/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Configuration management
//!
//! A configuration bundles an image, a mask, a geometry and a pattern. The
//! manager keeps several of them, tracks the selected one, routes integration
//! results from the background worker and persists projects and settings.

pub mod errors;
pub mod manager;
pub mod project;
pub mod settings;
pub mod signals;

pub use errors::{ConfigurationError, Result};
pub use manager::{Configuration, ConfigurationEvent, ConfigurationFlags, ConfigurationManager};
pub use project::{ConfigurationState, OverlayState, Project};
pub use settings::Settings;
pub use signals::{Signal, SubscriptionId};
