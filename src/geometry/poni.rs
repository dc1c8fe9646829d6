/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! PONI calibration files
//!
//! One `key: value` per line. Both the version 1 layout (`PixelSize1`,
//! `PixelSize2`) and the version 2 layout (`Detector_config` JSON holding
//! `pixel1`/`pixel2`) are read; files are written in version 2 form with the
//! pixel sizes also repeated as plain keys.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::errors::{GeometryError, Result};
use super::parameters::GeometryParameters;

/// Read a PONI file
pub fn read_poni<P: AsRef<Path>>(path: P) -> Result<GeometryParameters> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_poni(&content)
}

/// Parse the text of a PONI file
pub fn parse_poni(content: &str) -> Result<GeometryParameters> {
    let mut entries: HashMap<String, String> = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let number = |key: &str| -> Result<Option<f64>> {
        match entries.get(key) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("none") => Ok(None),
            Some(v) => v.parse::<f64>().map(Some).map_err(|_| {
                GeometryError::FormatError(format!("cannot parse {} value '{}'", key, v))
            }),
        }
    };
    let required = |key: &str| -> Result<f64> {
        number(key)?.ok_or_else(|| GeometryError::FormatError(format!("missing key '{}'", key)))
    };

    let mut pixel1 = number("pixelsize1")?;
    let mut pixel2 = number("pixelsize2")?;
    if let Some(config) = entries.get("detector_config") {
        let json: Value = serde_json::from_str(config)
            .map_err(|e| GeometryError::FormatError(format!("Detector_config: {}", e)))?;
        pixel1 = pixel1.or_else(|| json.get("pixel1").and_then(Value::as_f64));
        pixel2 = pixel2.or_else(|| json.get("pixel2").and_then(Value::as_f64));
    }

    let defaults = GeometryParameters::default();
    let params = GeometryParameters {
        distance: required("distance")?,
        poni1: required("poni1")?,
        poni2: required("poni2")?,
        rot1: number("rot1")?.unwrap_or(0.0),
        rot2: number("rot2")?.unwrap_or(0.0),
        rot3: number("rot3")?.unwrap_or(0.0),
        pixel1: pixel1.ok_or_else(|| GeometryError::FormatError("missing pixel size".to_string()))?,
        pixel2: pixel2.ok_or_else(|| GeometryError::FormatError("missing pixel size".to_string()))?,
        wavelength: required("wavelength")?,
        polarization_factor: number("polarizationfactor")?
            .or(number("polarization_factor")?)
            .unwrap_or(defaults.polarization_factor),
    };
    params.validate()?;
    Ok(params)
}

/// Render parameters as PONI text
pub fn format_poni(params: &GeometryParameters) -> String {
    let mut out = String::new();
    out.push_str("# Nota: C-Order, 1 refers to the Y axis, 2 to the X axis\n");
    out.push_str("poni_version: 2\n");
    out.push_str("Detector: Detector\n");
    out.push_str(&format!(
        "Detector_config: {{\"pixel1\": {:e}, \"pixel2\": {:e}, \"max_shape\": null}}\n",
        params.pixel1, params.pixel2
    ));
    out.push_str(&format!("PixelSize1: {:e}\n", params.pixel1));
    out.push_str(&format!("PixelSize2: {:e}\n", params.pixel2));
    out.push_str(&format!("Distance: {}\n", params.distance));
    out.push_str(&format!("Poni1: {}\n", params.poni1));
    out.push_str(&format!("Poni2: {}\n", params.poni2));
    out.push_str(&format!("Rot1: {}\n", params.rot1));
    out.push_str(&format!("Rot2: {}\n", params.rot2));
    out.push_str(&format!("Rot3: {}\n", params.rot3));
    out.push_str(&format!("Wavelength: {:e}\n", params.wavelength));
    out.push_str(&format!("PolarizationFactor: {}\n", params.polarization_factor));
    out
}

/// Write a PONI file atomically
pub fn write_poni<P: AsRef<Path>>(path: P, params: &GeometryParameters) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("poni.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(format_poni(params).as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PONI_V2: &str = "# Calibration done at Mon Jan 01 12:00:00 2024
poni_version: 2
Detector: Pilatus2M
Detector_config: {\"pixel1\": 0.000172, \"pixel2\": 0.000172, \"max_shape\": [1679, 1475]}
Distance: 0.2087
Poni1: 0.1432
Poni2:   0.1291
Rot1: 0.012
Rot2: -0.007
Rot3: 0.0
Wavelength: 4.06626e-11
";

    #[test]
    fn test_parse_version_two() {
        let params = parse_poni(PONI_V2).unwrap();
        assert_relative_eq!(params.distance, 0.2087);
        assert_relative_eq!(params.poni2, 0.1291);
        assert_relative_eq!(params.pixel1, 172e-6);
        assert_relative_eq!(params.wavelength_angstrom(), 0.406626, epsilon = 1e-12);
        assert_relative_eq!(params.polarization_factor, 0.99);
    }

    #[test]
    fn test_parse_version_one_pixel_keys() {
        let text = "PixelSize1: 7.9e-05\nPixelSize2: 7.9e-05\nDistance: 0.1\nPoni1: 0.01\nPoni2: 0.02\nWavelength: 3e-11\n";
        let params = parse_poni(text).unwrap();
        assert_relative_eq!(params.pixel2, 79e-6);
        assert_eq!(params.rot3, 0.0);
    }

    #[test]
    fn test_missing_distance_is_format_error() {
        let text = "PixelSize1: 1e-4\nPixelSize2: 1e-4\nPoni1: 0\nPoni2: 0\nWavelength: 3e-11\n";
        assert!(matches!(parse_poni(text), Err(GeometryError::FormatError(_))));
    }

    #[test]
    fn test_format_then_parse_keeps_values() {
        let params = parse_poni(PONI_V2).unwrap();
        let reread = parse_poni(&format_poni(&params)).unwrap();
        assert_eq!(params, reread);
    }
}
