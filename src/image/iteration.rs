/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Neighbouring files of the current image

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::errors::{ImageError, Result};

static TRAILING_DIGITS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.*?)(\d+)$").ok());

/// How the next or previous file is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IterationMode {
    /// Increment the trailing number of the file name
    #[default]
    Number,
    /// Order the files of the directory by creation time
    Time,
}

/// File `step` positions after (positive) or before (negative) `path`
pub fn neighbour(path: &Path, step: isize, mode: IterationMode) -> Result<Option<PathBuf>> {
    if step == 0 {
        return Ok(Some(path.to_path_buf()));
    }
    match mode {
        IterationMode::Number => Ok(number_neighbour(path, step)),
        IterationMode::Time => time_neighbour(path, step),
    }
}

/// Increment the trailing digits of the stem, keeping zero padding
///
/// When the padded name does not exist the padding width is reduced by one
/// and the lookup retried once.
pub fn number_neighbour(path: &Path, step: isize) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let captures = TRAILING_DIGITS.as_ref()?.captures(stem)?;
    let prefix = captures.get(1)?.as_str();
    let digits = captures.get(2)?.as_str();
    let value: i64 = digits.parse().ok()?;
    let next = value.checked_add(step as i64)?;
    if next < 0 {
        return None;
    }

    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let width = digits.len();
    let candidate = |width: usize| directory.join(format!("{}{:0width$}{}", prefix, next, extension, width = width));

    let first = candidate(width);
    if first.is_file() {
        return Some(first);
    }
    if width > 1 {
        let retry = candidate(width - 1);
        if retry.is_file() {
            return Some(retry);
        }
    }
    None
}

fn creation_time(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Sibling files with the same extension, oldest first
pub fn files_by_time(path: &Path) -> Result<Vec<PathBuf>> {
    let directory = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let extension = path.extension().map(|e| e.to_ascii_lowercase());
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in WalkDir::new(&directory).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // An unreadable directory is an error, an unreadable sibling is not
            Err(e) if e.depth() == 0 => return Err(ImageError::IoError(e.into())),
            Err(e) => {
                log::debug!("skipping directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.into_path();
        if p.extension().map(|e| e.to_ascii_lowercase()) == extension {
            files.push((creation_time(&p), p));
        }
    }
    files.sort();
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// Neighbour in creation-time order
pub fn time_neighbour(path: &Path, step: isize) -> Result<Option<PathBuf>> {
    let files = files_by_time(path)?;
    let Some(position) = files.iter().position(|p| same_file(p, path)) else {
        log::warn!("{} not found in its directory listing", path.display());
        return Ok(None);
    };
    let target = position as isize + step;
    if target < 0 {
        return Ok(None);
    }
    Ok(files.get(target as usize).cloned())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
