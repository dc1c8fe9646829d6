/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Azimuthal integration module
//!
//! Bins detector pixels by their radial coordinate into a 1D pattern
//! ([`integrate_1d`]) or by radial coordinate and azimuth into a cake
//! ([`integrate_2d`]). Long integrations run on an [`IntegrationWorker`]
//! thread that drops results superseded by a newer request.

pub mod cake;
pub mod errors;
pub mod options;
pub mod radial;
pub mod worker;

pub use cake::{integrate_2d, Cake};
pub use errors::{IntegrationError, Result};
pub use options::IntegrationOptions;
pub use radial::{integrate_1d, IntegratedPattern};
pub use worker::{IntegrationKey, IntegrationOutcome, IntegrationRequest, IntegrationWorker};
