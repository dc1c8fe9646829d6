/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Project files
//!
//! A project is a JSON document describing every configuration: which image
//! and background files were loaded, transforms, supersampling, the mask
//! (stored next to the project), geometry, integration options, overlays and
//! the pattern background state. Loading re-reads referenced files; files
//! that have disappeared are logged and skipped.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::Result;
use super::manager::{Configuration, ConfigurationFlags, ConfigurationManager};
use crate::geometry::GeometryParameters;
use crate::image::Transform;
use crate::integration::IntegrationOptions;
use crate::mask::io::write_mask;
use crate::pattern::Pattern;

pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayState {
    pub pattern: Pattern,
    pub visible: bool,
    pub color: [u8; 3],
}

/// Serializable state of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationState {
    pub image_path: Option<PathBuf>,
    pub series_index: usize,
    pub transforms: Vec<Transform>,
    pub supersampling: usize,
    pub background_path: Option<PathBuf>,
    pub background_scaling: f32,
    pub background_offset: f32,
    pub mask_path: Option<PathBuf>,
    pub geometry: GeometryParameters,
    pub calibration_path: Option<PathBuf>,
    pub options: IntegrationOptions,
    pub flags: ConfigurationFlags,
    pub autoprocess: bool,
    pub pattern: Pattern,
    pub overlays: Vec<OverlayState>,
    pub background_overlay: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    pub selected: usize,
    pub configurations: Vec<ConfigurationState>,
}

impl ConfigurationState {
    /// Capture `configuration`; a non-empty mask is written to `mask_path`
    fn capture(configuration: &Configuration, mask_path: PathBuf) -> Result<Self> {
        let image = &configuration.image;
        let background = image.background();
        if background.is_some_and(|b| b.path.is_none()) {
            log::warn!("background image has no file and is not stored in the project");
        }
        let mask_path = if configuration.mask.count() > 0 {
            write_mask(&mask_path, &configuration.mask.native())?;
            Some(mask_path)
        } else {
            None
        };
        let pattern_model = &configuration.pattern;
        Ok(Self {
            image_path: image.path().map(Path::to_path_buf),
            series_index: image.frame().map_or(0, |f| f.series_index()),
            transforms: image.transforms().to_vec(),
            supersampling: image.supersampling(),
            background_path: background.and_then(|b| b.path.clone()),
            background_scaling: background.map_or(1.0, |b| b.scaling),
            background_offset: background.map_or(0.0, |b| b.offset),
            mask_path,
            geometry: *configuration.geometry_parameters(),
            calibration_path: configuration.calibration_path.clone(),
            options: configuration.options.clone(),
            flags: configuration.flags,
            autoprocess: image.autoprocess(),
            pattern: pattern_model.pattern().clone(),
            overlays: pattern_model
                .overlays()
                .iter()
                .map(|o| OverlayState {
                    pattern: o.pattern.clone(),
                    visible: o.visible,
                    color: o.color,
                })
                .collect(),
            background_overlay: pattern_model.background_overlay(),
        })
    }

    /// Rebuild a configuration, skipping files that cannot be read
    fn restore(&self) -> Result<Configuration> {
        let mut configuration = Configuration::new();
        configuration.set_geometry_parameters(self.geometry)?;
        configuration.calibration_path = self.calibration_path.clone();
        configuration.options = self.options.clone();
        configuration.flags = self.flags;

        let image = &mut configuration.image;
        image.set_supersampling(self.supersampling);
        if let Some(path) = &self.image_path {
            match image.load_frame(path, self.series_index) {
                Ok(()) => {
                    for &transform in &self.transforms {
                        image.add_transform(transform);
                    }
                }
                Err(e) => log::warn!("image {} skipped: {}", path.display(), e),
            }
        }
        if let Some(path) = &self.background_path {
            match image.load_background(path) {
                Ok(()) => {
                    image.set_background_scaling(self.background_scaling);
                    image.set_background_offset(self.background_offset);
                }
                Err(e) => log::warn!("background {} skipped: {}", path.display(), e),
            }
        }
        if self.autoprocess && image.has_image() {
            if let Err(e) = image.set_autoprocess(true) {
                log::warn!("autoprocessing not restored: {}", e);
            }
        }

        if let (Some(path), Some(shape)) = (&self.mask_path, configuration.image.supersampled_shape()) {
            configuration.mask.ensure_shape(shape, self.supersampling);
            if let Err(e) = configuration.mask.load_native(path) {
                log::warn!("mask {} skipped: {}", path.display(), e);
            }
        }

        let patterns = &mut configuration.pattern;
        let primary = &self.pattern;
        if !primary.is_empty() {
            patterns.set_pattern(primary.x().to_vec(), primary.y().to_vec(), &primary.name)?;
        }
        for overlay in &self.overlays {
            let index = patterns.add_overlay(overlay.pattern.clone());
            patterns.set_overlay_visible(index, overlay.visible)?;
            patterns.set_overlay_color(index, overlay.color)?;
        }
        if let Some(index) = self.background_overlay {
            if let Err(e) = patterns.set_overlay_as_background(index) {
                log::warn!("background overlay {} not restored: {}", index, e);
            }
        }
        if let Some(params) = primary.auto_background() {
            if let Err(e) = patterns.set_auto_background(Some(*params)) {
                log::warn!("automatic background not restored: {}", e);
            }
        }
        Ok(configuration)
    }
}

impl ConfigurationManager {
    /// Capture every configuration
    ///
    /// Masks are written next to `path` as `<stem>_<index>.mask`.
    pub fn project(&self, path: &Path) -> Result<Project> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project");
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let configurations = self
            .configurations()
            .iter()
            .enumerate()
            .map(|(i, c)| ConfigurationState::capture(c, dir.join(format!("{}_{}.mask", stem, i))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Project {
            version: PROJECT_VERSION,
            selected: self.selected_index(),
            configurations,
        })
    }

    /// Write the project as JSON, atomically
    pub fn save_project<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let project = self.project(path)?;
        let json = serde_json::to_string_pretty(&project)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        log::info!("project saved to {}", path.display());
        Ok(())
    }

    /// Replace the configurations with those of a project file
    pub fn load_project<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let project: Project = serde_json::from_str(&fs::read_to_string(path)?)?;
        if project.version > PROJECT_VERSION {
            log::warn!(
                "project version {} is newer than {}, loading what is understood",
                project.version,
                PROJECT_VERSION
            );
        }
        let configurations = project
            .configurations
            .iter()
            .map(ConfigurationState::restore)
            .collect::<Result<Vec<_>>>()?;
        self.replace_configurations(configurations, project.selected)
    }
}
