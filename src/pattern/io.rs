/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Reading and writing of .xy, .chi and .dat pattern files

use std::fs;
use std::io::Write;
use std::path::Path;

use super::errors::{PatternError, Result};
use super::pattern::Pattern;

/// Number of header lines in a Fit2D .chi file
const CHI_HEADER_LINES: usize = 4;

fn is_chi(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("chi"))
        .unwrap_or(false)
}

/// Parse the first two whitespace separated columns of a data line
fn parse_row(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.split_whitespace();
    let x = fields.next()?.parse::<f64>().ok()?;
    let y = fields.next()?.parse::<f64>().ok()?;
    Some((x, y))
}

/// Parse pattern text
///
/// Lines starting with `#` and blank lines are skipped, as are the first
/// `skip` lines. The first data line must contain two floats.
pub fn parse_pattern(content: &str, skip: usize, name: &str) -> Result<Pattern> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (number, line) in content.lines().enumerate().skip(skip) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_row(trimmed) {
            Some((xv, yv)) => {
                x.push(xv);
                y.push(yv);
            }
            None => {
                return Err(PatternError::FormatError(format!(
                    "line {}: expected two numbers, got '{}'",
                    number + 1,
                    trimmed
                )))
            }
        }
    }
    if x.is_empty() {
        return Err(PatternError::FormatError("no data lines".to_string()));
    }
    Pattern::new(x, y, name)
}

/// Load a pattern; the name is the file stem
pub fn load_pattern<P: AsRef<Path>>(path: P) -> Result<Pattern> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let skip = if is_chi(path) { CHI_HEADER_LINES } else { 0 };
    let pattern = parse_pattern(&content, skip, name)?;
    log::debug!("loaded {} points from {}", pattern.len(), path.display());
    Ok(pattern)
}

/// Format the effective data of a pattern
///
/// `header` lines are written as `#` comments for .xy/.dat. For .chi the
/// Fit2D four line header is written instead, with `x_label` as axis title.
pub fn format_pattern(pattern: &Pattern, header: &str, x_label: &str, chi: bool) -> String {
    let (x, y) = pattern.data();
    let mut out = String::new();
    if chi {
        out.push_str(&format!("{}\n", pattern.name));
        out.push_str(&format!("{}\n", x_label));
        out.push_str("Intensity\n");
        out.push_str(&format!("{:>8}\n", x.len()));
    } else {
        for line in header.lines() {
            out.push_str(&format!("# {}\n", line));
        }
        out.push_str(&format!("# {:>14} {:>16}\n", x_label, "I"));
    }
    for (xv, yv) in x.iter().zip(&y) {
        out.push_str(&format!("{:16.8e} {:16.8e}\n", xv, yv));
    }
    out
}

/// Write the effective data to disk, atomically
pub fn save_pattern<P: AsRef<Path>>(
    path: P,
    pattern: &Pattern,
    header: &str,
    x_label: &str,
) -> Result<()> {
    let path = path.as_ref();
    let text = format_pattern(pattern, header, x_label, is_chi(path));
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
