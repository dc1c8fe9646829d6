/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Per-user settings in `<home>/.Dioptas`
//!
//! `working_directories.csv` maps a category (image, calibration, mask, ...)
//! to the directory last used for it; `settings.xml` remembers the last
//! calibration file. Missing files are not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::Result;

pub const SETTINGS_DIR_NAME: &str = ".Dioptas";
pub const WORKING_DIRECTORIES_FILE: &str = "working_directories.csv";
pub const SETTINGS_FILE: &str = "settings.xml";

static CALIBRATION_PATH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"<calibration_path>(.*?)</calibration_path>").ok());

/// The user's settings directory, `None` without a home directory
pub fn settings_dir() -> Option<PathBuf> {
    home::home_dir().map(|h| h.join(SETTINGS_DIR_NAME))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub working_directories: BTreeMap<String, PathBuf>,
    pub calibration_path: Option<PathBuf>,
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Settings {
    /// Load from the user's settings directory
    pub fn load() -> Result<Self> {
        match settings_dir() {
            Some(dir) => Self::load_from(dir),
            None => Ok(Self::default()),
        }
    }

    /// Load from `dir`; absent files leave the defaults
    pub fn load_from<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut settings = Self::default();

        let csv_path = dir.join(WORKING_DIRECTORIES_FILE);
        if csv_path.is_file() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&csv_path)?;
            for record in reader.records() {
                let record = record?;
                if let (Some(category), Some(path)) = (record.get(0), record.get(1)) {
                    settings
                        .working_directories
                        .insert(category.trim().to_string(), PathBuf::from(path.trim()));
                }
            }
        }

        let xml_path = dir.join(SETTINGS_FILE);
        if xml_path.is_file() {
            let content = fs::read_to_string(&xml_path)?;
            settings.calibration_path = CALIBRATION_PATH
                .as_ref()
                .and_then(|re| re.captures(&content))
                .and_then(|c| c.get(1))
                .map(|m| xml_unescape(m.as_str().trim()))
                .filter(|p| !p.is_empty())
                .map(PathBuf::from);
        }
        log::debug!("settings loaded from {}", dir.display());
        Ok(settings)
    }

    /// Save to the user's settings directory
    pub fn save(&self) -> Result<()> {
        match settings_dir() {
            Some(dir) => self.save_to(dir),
            None => {
                log::warn!("no home directory, settings not saved");
                Ok(())
            }
        }
    }

    /// Save to `dir`, creating it when needed
    pub fn save_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for (category, path) in &self.working_directories {
            let path = path.to_string_lossy();
            writer.write_record([category.as_str(), path.as_ref()])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        write_atomic(&dir.join(WORKING_DIRECTORIES_FILE), &bytes)?;

        let calibration = self
            .calibration_path
            .as_ref()
            .map(|p| xml_escape(&p.to_string_lossy()))
            .unwrap_or_default();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<settings>\n  <calibration_path>{}</calibration_path>\n</settings>\n",
            calibration
        );
        write_atomic(&dir.join(SETTINGS_FILE), xml.as_bytes())
    }

    pub fn working_directory(&self, category: &str) -> Option<&Path> {
        self.working_directories.get(category).map(PathBuf::as_path)
    }

    pub fn set_working_directory<P: Into<PathBuf>>(&mut self, category: &str, path: P) {
        self.working_directories.insert(category.to_string(), path.into());
    }
}
