/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Image state: frame, background, corrections and file navigation
//!
//! The effective image is
//! `supersample(T(raw) − α·T(background) − β) · Π corrections`
//! where `T` is the ordered transform list. It is rebuilt after every
//! mutation and announced on `image_changed`.

use ndarray::{Array2, Zip};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::corrections::{self, CorrectionSet, FLAT_FIELD};
use super::errors::{ImageError, Result};
use super::frame::{apply_transforms, supersample, ImageFrame, Transform};
use super::iteration::{self, IterationMode};
use super::load_worker::{load_file, LoadedFrame};
use super::loader::{self, ImageSource};
use super::watcher::{DirectoryWatcher, WatchEvent};
use crate::configuration::signals::Signal;

/// Background frame subtracted as α·B + β
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    pub raw: Array2<f32>,
    pub path: Option<PathBuf>,
    pub scaling: f32,
    pub offset: f32,
}

/// The image part of a configuration
pub struct ImageModel {
    frame: Option<ImageFrame>,
    source: Option<Box<dyn ImageSource>>,
    background: Option<BackgroundImage>,
    flat_field: Option<Array2<f32>>,
    corrections: CorrectionSet,
    supersampling: usize,
    iteration_mode: IterationMode,
    watcher: Option<DirectoryWatcher>,
    autoprocess: bool,
    effective: Option<Arc<Array2<f32>>>,
    /// Emitted after the effective image changed
    pub image_changed: Signal<()>,
    /// Human-readable warnings such as dropped mismatched corrections
    pub warnings: Signal<String>,
    /// Emitted once when the directory watcher gives up
    pub watcher_failed: Signal<String>,
}

impl Default for ImageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageModel")
            .field("path", &self.path())
            .field("shape", &self.shape())
            .field("supersampling", &self.supersampling)
            .field("transforms", &self.transforms())
            .field("autoprocess", &self.autoprocess)
            .finish_non_exhaustive()
    }
}

impl ImageModel {
    pub fn new() -> Self {
        Self {
            frame: None,
            source: None,
            background: None,
            flat_field: None,
            corrections: CorrectionSet::new(),
            supersampling: 1,
            iteration_mode: IterationMode::default(),
            watcher: None,
            autoprocess: false,
            effective: None,
            image_changed: Signal::new(),
            warnings: Signal::new(),
            watcher_failed: Signal::new(),
        }
    }

    /// Copy the image state into a model with its own signals and no watcher
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new();
        copy.frame = self.frame.clone();
        copy.background = self.background.clone();
        copy.flat_field = self.flat_field.clone();
        copy.corrections = self.corrections.clone();
        copy.supersampling = self.supersampling;
        copy.iteration_mode = self.iteration_mode;
        copy.autoprocess = self.autoprocess;
        copy.effective = self.effective.clone();
        copy
    }

    pub fn frame(&self) -> Option<&ImageFrame> {
        self.frame.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.frame.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.frame.as_ref().and_then(|f| f.path())
    }

    /// Transformed shape at native resolution
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.frame.as_ref().map(|f| f.shape())
    }

    /// Shape of the effective (supersampled) image
    pub fn supersampled_shape(&self) -> Option<(usize, usize)> {
        self.shape()
            .map(|(h, w)| (h * self.supersampling, w * self.supersampling))
    }

    pub fn supersampling(&self) -> usize {
        self.supersampling
    }

    pub fn transforms(&self) -> &[Transform] {
        self.frame.as_ref().map_or(&[], |f| f.transforms())
    }

    pub fn background(&self) -> Option<&BackgroundImage> {
        self.background.as_ref()
    }

    pub fn corrections(&self) -> &CorrectionSet {
        &self.corrections
    }

    pub fn iteration_mode(&self) -> IterationMode {
        self.iteration_mode
    }

    pub fn set_iteration_mode(&mut self, mode: IterationMode) {
        self.iteration_mode = mode;
    }

    /// The effective image, `None` before anything is loaded
    pub fn effective_image(&self) -> Option<Arc<Array2<f32>>> {
        self.effective.clone()
    }

    /// Effective image at native resolution, for the cake
    ///
    /// Corrections are averaged over each supersampling block.
    pub fn effective_image_native(&self) -> Option<Array2<f32>> {
        let frame = self.frame.as_ref()?;
        let mut data = self.subtract_background(frame);
        if let Some(map) = self.corrections.product() {
            let s = self.supersampling;
            let norm = (s * s) as f32;
            Zip::indexed(&mut data).for_each(|(i, j), v| {
                let mut sum = 0.0f32;
                for a in 0..s {
                    for b in 0..s {
                        sum += map[[i * s + a, j * s + b]];
                    }
                }
                *v *= sum / norm;
            });
        }
        Some(data)
    }

    /// Load frame 0 of `path`
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.load_frame(path, 0)
    }

    /// Load frame `index` of a possibly multi-frame file
    pub fn load_frame<P: AsRef<Path>>(&mut self, path: P, index: usize) -> Result<()> {
        let loaded = load_file(path.as_ref(), index)?;
        self.install_loaded(loaded);
        Ok(())
    }

    /// Install a frame decoded off the foreground
    pub fn install_loaded(&mut self, loaded: LoadedFrame) {
        let LoadedFrame {
            raw,
            metadata: meta,
            source,
        } = loaded;
        log::info!("loaded {} [{} of {}]", meta.path.display(), meta.index + 1, meta.series_len);
        self.install_frame(ImageFrame::new(raw, Some(meta.path), meta.index, meta.series_len));
        self.source = Some(source);
        self.refresh();
    }

    /// Switch to frame `index` of the current series
    pub fn load_series_frame(&mut self, index: usize) -> Result<()> {
        let source = self.source.as_mut().ok_or(ImageError::NoImage)?;
        let (raw, meta) = source.read(index)?;
        self.install_frame(ImageFrame::new(raw, Some(meta.path), meta.index, meta.series_len));
        self.refresh();
        Ok(())
    }

    /// Use an in-memory array as the image
    pub fn set_image_data(&mut self, raw: Array2<f32>) {
        self.source = None;
        self.install_frame(ImageFrame::from_array(raw));
        self.refresh();
    }

    /// New frames keep the transform list of the previous one
    fn install_frame(&mut self, mut frame: ImageFrame) {
        let transforms = self.transforms().to_vec();
        if !transforms.is_empty() {
            frame.set_transforms(&transforms);
        }
        self.frame = Some(frame);
    }

    /// Load the file `step` positions after the current one
    ///
    /// Returns the loaded path, or `None` when no such file exists.
    pub fn load_next(&mut self, step: usize) -> Result<Option<PathBuf>> {
        self.load_neighbour(step as isize)
    }

    /// Load the file `step` positions before the current one
    pub fn load_previous(&mut self, step: usize) -> Result<Option<PathBuf>> {
        self.load_neighbour(-(step as isize))
    }

    fn load_neighbour(&mut self, step: isize) -> Result<Option<PathBuf>> {
        let current = self.path().ok_or(ImageError::NoImage)?.to_path_buf();
        let Some(next) = iteration::neighbour(&current, step, self.iteration_mode)? else {
            return Ok(None);
        };
        self.load(&next)?;
        Ok(Some(next))
    }

    pub fn add_transform(&mut self, transform: Transform) {
        if let Some(frame) = self.frame.as_mut() {
            frame.add_transform(transform);
            self.refresh();
        }
    }

    pub fn remove_last_transform(&mut self) -> Option<Transform> {
        let removed = self.frame.as_mut()?.remove_last_transform();
        self.refresh();
        removed
    }

    pub fn reset_transforms(&mut self) {
        if let Some(frame) = self.frame.as_mut() {
            frame.reset_transforms();
            self.refresh();
        }
    }

    pub fn set_supersampling(&mut self, factor: usize) {
        let factor = factor.max(1);
        if factor != self.supersampling {
            self.supersampling = factor;
            self.refresh();
        }
    }

    /// Load a background frame from file
    pub fn load_background<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let (raw, _) = loader::open(path)?.read(0)?;
        self.background = Some(BackgroundImage {
            raw,
            path: Some(path.to_path_buf()),
            scaling: self.background.as_ref().map_or(1.0, |b| b.scaling),
            offset: self.background.as_ref().map_or(0.0, |b| b.offset),
        });
        self.refresh();
        Ok(())
    }

    /// Use an in-memory background frame
    pub fn set_background_data(&mut self, raw: Array2<f32>) {
        self.background = Some(BackgroundImage {
            raw,
            path: None,
            scaling: 1.0,
            offset: 0.0,
        });
        self.refresh();
    }

    pub fn clear_background(&mut self) {
        if self.background.take().is_some() {
            self.refresh();
        }
    }

    pub fn set_background_scaling(&mut self, scaling: f32) {
        if let Some(bkg) = self.background.as_mut() {
            bkg.scaling = scaling;
            self.refresh();
        }
    }

    pub fn set_background_offset(&mut self, offset: f32) {
        if let Some(bkg) = self.background.as_mut() {
            bkg.offset = offset;
            self.refresh();
        }
    }

    /// Set or clear the flat field (raw, untransformed orientation)
    pub fn set_flat_field(&mut self, flat: Option<Array2<f32>>) -> Result<()> {
        if let Some(flat) = &flat {
            corrections::flat_field(flat)?;
        }
        self.flat_field = flat;
        if self.flat_field.is_none() {
            self.corrections.remove(FLAT_FIELD);
        }
        self.refresh();
        Ok(())
    }

    /// Add or replace a correction given at the supersampled image shape
    pub fn set_correction(&mut self, name: &str, factors: Array2<f32>) -> Result<()> {
        if let Some(shape) = self.supersampled_shape() {
            if factors.dim() != shape {
                return Err(ImageError::ShapeMismatch {
                    expected: shape,
                    found: factors.dim(),
                });
            }
        }
        self.corrections.add(name, factors)?;
        self.refresh();
        Ok(())
    }

    /// Add or replace an absorption correction
    pub fn set_absorption_correction(&mut self, name: &str, factors: Option<Array2<f32>>) -> Result<()> {
        match factors {
            Some(factors) => self.set_correction(name, factors),
            None => {
                self.remove_correction(name);
                Ok(())
            }
        }
    }

    pub fn remove_correction(&mut self, name: &str) -> bool {
        let removed = self.corrections.remove(name).is_some();
        if removed {
            self.refresh();
        }
        removed
    }

    fn warn(&self, message: String) {
        log::warn!("{}", message);
        self.warnings.emit(message);
    }

    /// T(raw) − α·T(bkg) − β at native resolution
    fn subtract_background(&self, frame: &ImageFrame) -> Array2<f32> {
        let mut data = frame.data().clone();
        if let Some(bkg) = &self.background {
            let transformed = apply_transforms(&bkg.raw, frame.transforms());
            if transformed.dim() == data.dim() {
                let (alpha, beta) = (bkg.scaling, bkg.offset);
                Zip::from(&mut data)
                    .and(&transformed)
                    .for_each(|v, &b| *v = *v - alpha * b - beta);
            }
        }
        data
    }

    /// Rebuild the effective image and notify subscribers
    fn refresh(&mut self) {
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let shape = frame.shape();

        if let Some(bkg) = &self.background {
            let bkg_shape = frame
                .transforms()
                .iter()
                .fold(bkg.raw.dim(), |s, t| t.output_shape(s));
            if bkg_shape != shape {
                let message = format!(
                    "background shape {:?} does not match image shape {:?}; background removed",
                    bkg_shape, shape
                );
                self.background = None;
                self.warn(message);
            }
        }

        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let s = self.supersampling;
        let mut data = supersample(&self.subtract_background(frame), s);

        // The flat field is rebuilt below, so only other corrections are reported
        for name in self.corrections.retain_shape(data.dim()) {
            if name != FLAT_FIELD {
                self.warnings.emit(format!("correction '{}' removed after a shape change", name));
            }
        }

        if let Some(flat) = &self.flat_field {
            let transformed = apply_transforms(flat, frame.transforms());
            let factors = if transformed.dim() == shape {
                corrections::flat_field(&transformed)
            } else {
                Err(ImageError::ShapeMismatch {
                    expected: shape,
                    found: transformed.dim(),
                })
            };
            let added = factors.and_then(|f| self.corrections.add(FLAT_FIELD, supersample(&f, s)));
            if let Err(e) = added {
                self.flat_field = None;
                self.corrections.remove(FLAT_FIELD);
                self.warn(format!("flat field removed: {}", e));
            }
        }

        if let Err(e) = self.corrections.apply(&mut data) {
            self.warn(format!("corrections not applied: {}", e));
        }

        self.effective = Some(Arc::new(data));
        self.image_changed.emit(());
    }

    pub fn autoprocess(&self) -> bool {
        self.autoprocess
    }

    /// Enable or disable watching the current image's directory
    pub fn set_autoprocess(&mut self, enabled: bool) -> Result<()> {
        self.autoprocess = enabled;
        if !enabled {
            if let Some(mut watcher) = self.watcher.take() {
                watcher.stop();
            }
            return Ok(());
        }
        let directory = self
            .path()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .ok_or(ImageError::NoImage)?;
        let directory = if directory.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            directory
        };
        if self.watcher.as_ref().is_some_and(|w| w.directory() == directory) {
            return Ok(());
        }
        match DirectoryWatcher::start(&directory) {
            Ok(watcher) => {
                self.watcher = Some(watcher);
                Ok(())
            }
            Err(e) => {
                self.autoprocess = false;
                Err(e)
            }
        }
    }

    /// Suspend the watcher without forgetting the autoprocess flag
    pub fn suspend_watcher(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// Restart the watcher when the autoprocess flag is set
    pub fn resume_watcher(&mut self) -> Result<()> {
        if self.autoprocess && self.watcher.is_none() && self.has_image() {
            self.set_autoprocess(true)?;
        }
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Newest file announced by the watcher since the last poll
    ///
    /// Older announcements in the same batch are skipped. Nothing is loaded
    /// here; the caller decides where decoding runs.
    pub fn take_new_file(&mut self) -> Option<PathBuf> {
        let watcher = self.watcher.as_ref()?;
        let mut newest = None;
        for event in watcher.poll() {
            match event {
                WatchEvent::NewFile(path) => newest = Some(path),
                WatchEvent::Failed(message) => {
                    self.watcher = None;
                    self.autoprocess = false;
                    log::warn!("autoprocessing disabled: {}", message);
                    self.watcher_failed.emit(message);
                    return None;
                }
            }
        }
        newest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_background_subtraction_with_scaling_and_offset() {
        let mut model = ImageModel::new();
        model.set_image_data(array![[10.0, 20.0], [30.0, 40.0]]);
        model.set_background_data(array![[1.0, 2.0], [3.0, 4.0]]);
        model.set_background_scaling(2.0);
        model.set_background_offset(1.0);
        let image = model.effective_image().unwrap();
        assert_eq!(*image, array![[7.0, 15.0], [23.0, 31.0]]);
    }

    #[test]
    fn test_mismatched_background_is_dropped_with_warning() {
        let mut model = ImageModel::new();
        let (_, warnings) = model.warnings.subscribe();
        model.set_image_data(Array2::ones((4, 4)));
        model.set_background_data(Array2::ones((3, 4)));
        assert!(model.background().is_none());
        assert_eq!(*model.effective_image().unwrap(), Array2::<f32>::ones((4, 4)));
        assert!(warnings.try_recv().is_ok());
    }

    #[test]
    fn test_background_follows_transforms() {
        let mut model = ImageModel::new();
        model.set_image_data(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        model.set_background_data(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        model.add_transform(Transform::RotateCw);
        assert_eq!(model.shape(), Some((3, 2)));
        assert!(model.effective_image().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_supersampling_and_corrections() {
        let mut model = ImageModel::new();
        model.set_image_data(array![[1.0, 2.0]]);
        model.set_supersampling(2);
        assert_eq!(model.supersampled_shape(), Some((2, 4)));
        model
            .set_correction("scale", Array2::from_elem((2, 4), 3.0))
            .unwrap();
        assert_eq!(*model.effective_image().unwrap(), array![[3.0, 3.0, 6.0, 6.0], [3.0, 3.0, 6.0, 6.0]]);
        assert_eq!(model.effective_image_native().unwrap(), array![[3.0, 6.0]]);
        model.set_supersampling(1);
        assert!(model.corrections().is_empty());
    }

    #[test]
    fn test_flat_field_follows_orientation() {
        let mut model = ImageModel::new();
        model.set_image_data(array![[2.0, 2.0], [2.0, 2.0]]);
        model.set_flat_field(Some(array![[1.0, 1.0], [3.0, 3.0]])).unwrap();
        assert_eq!(*model.effective_image().unwrap(), array![[4.0, 4.0], [4.0 / 3.0, 4.0 / 3.0]]);
        model.add_transform(Transform::FlipVertical);
        assert_eq!(*model.effective_image().unwrap(), array![[4.0 / 3.0, 4.0 / 3.0], [4.0, 4.0]]);
        model.set_flat_field(None).unwrap();
        assert!(model.corrections().is_empty());
    }

    #[test]
    fn test_flat_field_survives_supersampling_change() {
        let mut model = ImageModel::new();
        model.set_image_data(array![[2.0, 2.0], [2.0, 2.0]]);
        model.set_flat_field(Some(array![[1.0, 1.0], [3.0, 3.0]])).unwrap();
        model.set_correction("scale", Array2::from_elem((2, 2), 1.0)).unwrap();
        let (_, warnings) = model.warnings.subscribe();
        model.set_supersampling(2);
        let effective = model.effective_image().unwrap();
        assert_eq!(effective.dim(), (4, 4));
        assert_eq!(effective[[0, 0]], 4.0);
        assert_eq!(effective[[3, 3]], 4.0 / 3.0);
        assert_eq!(model.corrections().names(), vec![FLAT_FIELD]);
        let messages: Vec<String> = warnings.try_iter().collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("scale"));
    }

    #[test]
    fn test_mismatched_flat_field_is_dropped_with_warning() {
        let mut model = ImageModel::new();
        model.set_image_data(Array2::from_elem((2, 2), 1.0));
        model.set_flat_field(Some(Array2::from_elem((2, 2), 1.0))).unwrap();
        let (_, warnings) = model.warnings.subscribe();
        model.set_image_data(Array2::from_elem((3, 2), 1.0));
        assert!(model.corrections().get(FLAT_FIELD).is_none());
        assert_eq!(warnings.try_iter().count(), 1);
        assert_eq!(*model.effective_image().unwrap(), Array2::from_elem((3, 2), 1.0));
    }

    #[test]
    fn test_image_changed_is_emitted() {
        let mut model = ImageModel::new();
        let (_, rx) = model.image_changed.subscribe();
        model.set_image_data(Array2::zeros((2, 2)));
        model.add_transform(Transform::FlipHorizontal);
        assert_eq!(rx.try_iter().count(), 2);
    }
}
