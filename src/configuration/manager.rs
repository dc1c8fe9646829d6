/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Configurations and the manager that switches between them
//!
//! A configuration bundles one image, mask, geometry and pattern. The
//! manager owns a non-empty list of them, one of which is selected, and two
//! background workers: one decodes image files, the other integrates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::{ConfigurationError, Result};
use super::signals::Signal;
use crate::geometry::poni::{read_poni, write_poni};
use crate::geometry::{Geometry, GeometryParameters};
use crate::image::{ImageModel, LoadWorker};
use crate::integration::{
    integrate_1d, integrate_2d, Cake, IntegratedPattern, IntegrationError, IntegrationOptions,
    IntegrationRequest, IntegrationWorker,
};
use crate::mask::MaskModel;
use crate::pattern::PatternModel;

/// Display and processing switches restored on selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFlags {
    /// Exclude masked pixels from integration
    pub use_mask: bool,
    pub mask_visible: bool,
    pub background_visible: bool,
    /// Also compute the cake after each integration
    pub integrate_cake: bool,
}

impl Default for ConfigurationFlags {
    fn default() -> Self {
        Self {
            use_mask: true,
            mask_visible: true,
            background_visible: true,
            integrate_cake: false,
        }
    }
}

/// One {image, mask, geometry, pattern} bundle
#[derive(Debug, Default)]
pub struct Configuration {
    pub image: ImageModel,
    pub mask: MaskModel,
    pub geometry: Arc<Geometry>,
    pub pattern: PatternModel,
    pub options: IntegrationOptions,
    pub flags: ConfigurationFlags,
    pub cake: Option<Cake>,
    /// Calibration file the geometry came from
    pub calibration_path: Option<PathBuf>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy without subscribers or watcher
    pub fn duplicate(&self) -> Self {
        let mut image = self.image.duplicate();
        image.suspend_watcher();
        Self {
            image,
            mask: self.mask.clone(),
            geometry: Arc::new(Geometry::clone(&self.geometry)),
            pattern: self.pattern.duplicate(),
            options: self.options.clone(),
            flags: self.flags,
            cake: self.cake.clone(),
            calibration_path: self.calibration_path.clone(),
        }
    }

    pub fn geometry_parameters(&self) -> &GeometryParameters {
        self.geometry.parameters()
    }

    /// Replace the geometry parameters; cached arrays are recomputed lazily
    pub fn set_geometry_parameters(&mut self, params: GeometryParameters) -> Result<()> {
        Arc::make_mut(&mut self.geometry).set_parameters(params)?;
        Ok(())
    }

    /// Load geometry from a PONI file
    pub fn load_calibration<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let params = read_poni(path)?;
        self.set_geometry_parameters(params)?;
        self.calibration_path = Some(path.to_path_buf());
        log::info!("calibration loaded from {}", path.display());
        Ok(())
    }

    pub fn save_calibration<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        write_poni(path, self.geometry.parameters())?;
        self.calibration_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Bring the mask to the shape of the effective image
    ///
    /// A mask at another supersampling of the same frame is resampled; a
    /// mask of another frame shape is cleared with a warning.
    fn align_mask(&mut self) -> Result<()> {
        let shape = self.image.supersampled_shape().ok_or(crate::image::ImageError::NoImage)?;
        let s = self.image.supersampling();
        if self.mask.shape() == shape && self.mask.supersampling() == s {
            return Ok(());
        }
        let native = self.image.shape().unwrap_or(shape);
        let mask_native = {
            let (h, w) = self.mask.shape();
            let ms = self.mask.supersampling();
            (h / ms, w / ms)
        };
        if mask_native == native && self.mask.count() > 0 {
            self.mask.set_supersampling(s);
        } else {
            if self.mask.count() > 0 {
                log::warn!(
                    "mask shape {:?} does not match image shape {:?}, mask cleared",
                    self.mask.shape(),
                    shape
                );
            }
            self.mask.ensure_shape(shape, s);
        }
        Ok(())
    }

    fn integration_options(&self) -> IntegrationOptions {
        IntegrationOptions {
            supersampling: self.image.supersampling(),
            ..self.options.clone()
        }
    }

    fn mask_for_integration(&self) -> Option<Arc<ndarray::Array2<bool>>> {
        (self.flags.use_mask && self.mask.count() > 0).then(|| Arc::new(self.mask.mask().clone()))
    }

    /// Build a worker request for the current state
    pub fn integration_request(&mut self, index: usize) -> Result<IntegrationRequest> {
        self.align_mask()?;
        let image = self
            .image
            .effective_image()
            .ok_or(crate::image::ImageError::NoImage)?;
        Ok(IntegrationRequest {
            configuration: index,
            image,
            mask: self.mask_for_integration(),
            geometry: Arc::clone(&self.geometry),
            options: self.integration_options(),
        })
    }

    /// Integrate on the calling thread and publish the pattern
    pub fn integrate(&mut self) -> Result<()> {
        let request = self.integration_request(0)?;
        let result = integrate_1d(
            request.image.view(),
            request.mask.as_ref().map(|m| m.view()),
            &request.geometry,
            &request.options,
        );
        self.publish(result)?;
        if self.flags.integrate_cake {
            self.integrate_cake()?;
        }
        Ok(())
    }

    /// Replace the primary pattern with an integration result
    ///
    /// An empty integration keeps the previous pattern.
    pub fn publish(&mut self, result: crate::integration::Result<IntegratedPattern>) -> Result<()> {
        let pattern = result?;
        let name = self
            .image
            .path()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("integrated")
            .to_string();
        self.pattern.set_pattern(pattern.x, pattern.y, &name)?;
        Ok(())
    }

    /// Compute the cake from the native resolution image
    pub fn integrate_cake(&mut self) -> Result<&Cake> {
        let image = self
            .image
            .effective_image_native()
            .ok_or(crate::image::ImageError::NoImage)?;
        let mask = (self.flags.use_mask && self.mask.count() > 0).then(|| self.mask.native());
        let options = IntegrationOptions {
            supersampling: 1,
            ..self.options.clone()
        };
        let cake = integrate_2d(image.view(), mask.as_ref().map(|m| m.view()), &self.geometry, &options)?;
        Ok(self.cake.insert(cake))
    }
}

/// Notifications about the configuration list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationEvent {
    Added(usize),
    Removed(usize),
    Selected(usize),
}

/// Owner of the configuration list
pub struct ConfigurationManager {
    configurations: Vec<Configuration>,
    selected: usize,
    worker: IntegrationWorker,
    loader: LoadWorker,
    pub events: Signal<ConfigurationEvent>,
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationManager {
    /// Start with one empty configuration
    pub fn new() -> Self {
        Self {
            configurations: vec![Configuration::new()],
            selected: 0,
            worker: IntegrationWorker::spawn(),
            loader: LoadWorker::spawn(),
            events: Signal::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Always false; the list is never empty
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn get(&self, index: usize) -> Result<&Configuration> {
        self.configurations
            .get(index)
            .ok_or(ConfigurationError::NoSuchConfiguration(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Configuration> {
        self.configurations
            .get_mut(index)
            .ok_or(ConfigurationError::NoSuchConfiguration(index))
    }

    pub fn current(&self) -> &Configuration {
        &self.configurations[self.selected]
    }

    pub fn current_mut(&mut self) -> &mut Configuration {
        &mut self.configurations[self.selected]
    }

    /// Append a configuration and select it
    ///
    /// With `copy_current` the new configuration is a deep copy of the
    /// selected one, otherwise it starts empty.
    pub fn add(&mut self, copy_current: bool) -> Result<usize> {
        let configuration = if copy_current {
            self.current().duplicate()
        } else {
            Configuration::new()
        };
        self.configurations.push(configuration);
        let index = self.configurations.len() - 1;
        self.events.emit(ConfigurationEvent::Added(index));
        self.select(index)?;
        Ok(index)
    }

    /// Remove configuration `index`; the last one cannot be removed
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.configurations.len() {
            return Err(ConfigurationError::NoSuchConfiguration(index));
        }
        if self.configurations.len() == 1 {
            return Err(ConfigurationError::LastConfiguration);
        }
        let mut removed = self.configurations.remove(index);
        removed.image.suspend_watcher();
        // Pending loads are keyed by index, which just shifted
        self.loader.cancel_all();
        self.events.emit(ConfigurationEvent::Removed(index));

        let selected = if self.selected > index || self.selected >= self.configurations.len() {
            self.selected.saturating_sub(1)
        } else {
            self.selected
        };
        // Force the re-publication even when the index is unchanged
        self.selected = usize::MAX;
        self.select(selected)
    }

    /// Select configuration `index` and re-publish its state
    ///
    /// The previously selected configuration's watcher is suspended and the
    /// new one's is resumed when its autoprocess flag is set.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.configurations.len() {
            return Err(ConfigurationError::NoSuchConfiguration(index));
        }
        if let Some(previous) = self.configurations.get_mut(self.selected) {
            if self.selected != index {
                previous.image.suspend_watcher();
            }
        }
        self.selected = index;
        let current = &mut self.configurations[index];
        if let Err(e) = current.image.resume_watcher() {
            log::warn!("directory watcher not resumed: {}", e);
        }
        self.events.emit(ConfigurationEvent::Selected(index));
        current.image.image_changed.emit(());
        current.pattern.pattern_changed.emit(());
        Ok(())
    }

    /// Replace the whole list, e.g. after loading a project
    pub(super) fn replace_configurations(
        &mut self,
        configurations: Vec<Configuration>,
        selected: usize,
    ) -> Result<()> {
        if configurations.is_empty() {
            return Err(ConfigurationError::FormatError(
                "a project needs at least one configuration".to_string(),
            ));
        }
        for removed in &mut self.configurations {
            removed.image.suspend_watcher();
        }
        self.loader.cancel_all();
        self.configurations = configurations;
        for (index, configuration) in self.configurations.iter_mut().enumerate() {
            if index != selected {
                configuration.image.suspend_watcher();
            }
        }
        self.selected = usize::MAX;
        self.select(selected.min(self.configurations.len() - 1))
    }

    /// Queue an integration of configuration `index` on the worker
    ///
    /// A newer request for the same configuration, unit and bin count
    /// supersedes this one.
    pub fn submit_integration(&mut self, index: usize) -> Result<u64> {
        let request = self.get_mut(index)?.integration_request(index)?;
        Ok(self.worker.submit(request)?)
    }

    /// Queue frame `frame` of `path` for configuration `index` on the loader
    ///
    /// The frame is installed and integrated by a later
    /// [`process_results`](Self::process_results). A newer load for the
    /// same configuration supersedes this one.
    pub fn request_load(&mut self, index: usize, path: PathBuf, frame: usize) -> Result<u64> {
        self.get(index)?;
        Ok(self.loader.submit(index, path, frame)?)
    }

    /// Install finished loads and queue their integration
    fn install_loads(&mut self) -> usize {
        let mut installed = 0;
        for outcome in self.loader.drain_current() {
            let index = outcome.configuration;
            let Some(configuration) = self.configurations.get_mut(index) else {
                continue;
            };
            match outcome.result {
                Ok(loaded) => {
                    configuration.image.install_loaded(loaded);
                    installed += 1;
                    if let Err(e) = self.submit_integration(index) {
                        log::debug!("configuration {}: not integrated: {}", index, e);
                    }
                }
                Err(e) => log::warn!(
                    "configuration {}: loading {} failed: {}",
                    index,
                    outcome.path.display(),
                    e
                ),
            }
        }
        installed
    }

    /// Install finished loads and publish finished integrations
    ///
    /// Returns how many patterns changed. Never waits on either worker.
    pub fn process_results(&mut self) -> usize {
        self.install_loads();
        let mut published = 0;
        for outcome in self.worker.drain_current() {
            let index = outcome.key.configuration;
            let Some(configuration) = self.configurations.get_mut(index) else {
                continue;
            };
            match configuration.publish(outcome.result) {
                Ok(()) => published += 1,
                Err(ConfigurationError::Integration(IntegrationError::EmptyIntegration)) => {
                    log::warn!("configuration {}: nothing to integrate, pattern kept", index)
                }
                Err(e) => log::warn!("configuration {}: integration failed: {}", index, e),
            }
        }
        published
    }

    /// Wait for the worker to publish at least one result
    pub fn wait_for_results(&mut self, timeout: std::time::Duration) -> usize {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let published = self.process_results();
            if published > 0 || std::time::Instant::now() >= deadline {
                return published;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    /// Queue a load of the newest file announced by the selected
    /// configuration's watcher
    ///
    /// Returns the queued path; the frame is installed and integrated by
    /// [`process_results`](Self::process_results).
    pub fn poll_watcher(&mut self) -> Result<Option<PathBuf>> {
        let index = self.selected;
        let Some(path) = self.configurations[index].image.take_new_file() else {
            return Ok(None);
        };
        self.request_load(index, path.clone(), 0)?;
        Ok(Some(path))
    }
}
