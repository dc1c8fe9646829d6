/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Mask persistence
//!
//! Layout: magic `DMSK`, u16 version, u32 height, u32 width (all little
//! endian), then ⌈H·W/8⌉ bytes of row-major bits, least significant bit first.
//! Files without the magic are read as a legacy 0/1 matrix, either a TIFF
//! image or whitespace separated text.

use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::errors::{MaskError, Result};
use crate::image::loader::read_tiff;

pub const MAGIC: &[u8; 4] = b"DMSK";
pub const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// Encode a mask as packed bits with header
pub fn encode(mask: &Array2<bool>) -> Vec<u8> {
    let (h, w) = mask.dim();
    let mut bytes = Vec::with_capacity(HEADER_LEN + (h * w).div_ceil(8));
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(h as u32).to_le_bytes());
    bytes.extend_from_slice(&(w as u32).to_le_bytes());
    let mut packed = vec![0u8; (h * w).div_ceil(8)];
    for (k, &bit) in mask.iter().enumerate() {
        if bit {
            packed[k / 8] |= 1 << (k % 8);
        }
    }
    bytes.extend_from_slice(&packed);
    bytes
}

/// Decode a packed mask
pub fn decode(bytes: &[u8]) -> Result<Array2<bool>> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(MaskError::FormatError("missing DMSK header".to_string()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(MaskError::FormatError(format!("unsupported mask version {}", version)));
    }
    let h = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let w = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != (h * w).div_ceil(8) {
        return Err(MaskError::FormatError(format!(
            "expected {} data bytes for a {}x{} mask, found {}",
            (h * w).div_ceil(8),
            h,
            w,
            payload.len()
        )));
    }
    Ok(Array2::from_shape_fn((h, w), |(i, j)| {
        let k = i * w + j;
        payload[k / 8] & (1 << (k % 8)) != 0
    }))
}

/// Write a mask atomically through a temporary file
pub fn write_mask<P: AsRef<Path>>(path: P, mask: &Array2<bool>) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("mask.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&encode(mask))?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a mask in packed or legacy form
pub fn read_mask<P: AsRef<Path>>(path: P) -> Result<Array2<bool>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    if bytes.starts_with(MAGIC) {
        return decode(&bytes);
    }
    log::debug!("{} has no DMSK header, trying legacy formats", path.display());
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        let frames = read_tiff(path).map_err(|e| MaskError::FormatError(e.to_string()))?;
        let frame = frames
            .into_iter()
            .next()
            .ok_or_else(|| MaskError::FormatError("empty TIFF mask".to_string()))?;
        return Ok(frame.mapv(|v| v != 0.0));
    }
    parse_text_matrix(&String::from_utf8_lossy(&bytes))
}

/// Parse a whitespace separated 0/1 matrix
fn parse_text_matrix(text: &str) -> Result<Array2<bool>> {
    let mut rows: Vec<Vec<bool>> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| match t.parse::<i64>() {
                Ok(0) => Ok(false),
                Ok(1) => Ok(true),
                _ => Err(MaskError::FormatError(format!("'{}' is not 0 or 1", t))),
            })
            .collect::<Result<Vec<bool>>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(MaskError::FormatError("ragged mask matrix".to_string()));
            }
        }
        rows.push(row);
    }
    let h = rows.len();
    let w = rows.first().map_or(0, Vec::len);
    if h == 0 || w == 0 {
        return Err(MaskError::FormatError("empty mask matrix".to_string()));
    }
    Array2::from_shape_vec((h, w), rows.into_iter().flatten().collect())
        .map_err(|e| MaskError::FormatError(e.to_string()))
}
