/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Image module
//!
//! File loading, the transform and supersampling pipeline, multiplicative
//! corrections, neighbouring-file iteration and the directory watcher that
//! feeds autoprocessing.

pub mod corrections;
pub mod errors;
pub mod frame;
pub mod iteration;
pub mod load_worker;
pub mod loader;
pub mod model;
pub mod watcher;

pub use corrections::{Correction, CorrectionSet};
pub use errors::{ImageError, Result};
pub use frame::{ImageFrame, Transform};
pub use iteration::IterationMode;
pub use load_worker::{load_file, LoadOutcome, LoadWorker, LoadedFrame};
pub use loader::{open, stitch_modules, FrameMetadata, ImageSource};
pub use model::{BackgroundImage, ImageModel};
pub use watcher::{DirectoryWatcher, WatchEvent};
