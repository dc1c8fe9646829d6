/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Calibrant reference materials

use once_cell::sync::Lazy;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{GeometryError, Result};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "DIOPTAS_DATA_DIR";

/// A reference material with known d-spacings in Angstrom, sorted descending
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrant {
    pub name: String,
    pub d_spacings: Vec<f64>,
}

/// Lattice centering used to generate the built-in cubic calibrants
#[derive(Clone, Copy)]
enum CubicLattice {
    Primitive,
    FaceCentered,
    Diamond,
}

impl CubicLattice {
    fn allows(self, h: i32, k: i32, l: i32) -> bool {
        let all_even = h % 2 == 0 && k % 2 == 0 && l % 2 == 0;
        let all_odd = h % 2 != 0 && k % 2 != 0 && l % 2 != 0;
        match self {
            CubicLattice::Primitive => true,
            CubicLattice::FaceCentered => all_even || all_odd,
            CubicLattice::Diamond => all_odd || (all_even && (h + k + l) % 4 == 0),
        }
    }
}

/// Distinct d-spacings of a cubic lattice down to `d_min`
fn cubic_d_spacings(a: f64, lattice: CubicLattice, d_min: f64) -> Vec<f64> {
    let max_index = (a / d_min).ceil() as i32;
    let mut sums: Vec<i32> = Vec::new();
    for h in 0..=max_index {
        for k in 0..=h {
            for l in 0..=k {
                let n = h * h + k * k + l * l;
                if n == 0 || !lattice.allows(h, k, l) {
                    continue;
                }
                if a / (n as f64).sqrt() >= d_min && !sums.contains(&n) {
                    sums.push(n);
                }
            }
        }
    }
    sums.sort_unstable();
    sums.into_iter().map(|n| a / (n as f64).sqrt()).collect()
}

static BUILTIN: Lazy<Vec<Calibrant>> = Lazy::new(|| {
    vec![
        Calibrant {
            name: "LaB6".to_string(),
            d_spacings: cubic_d_spacings(4.15689, CubicLattice::Primitive, 0.5),
        },
        Calibrant {
            name: "CeO2".to_string(),
            d_spacings: cubic_d_spacings(5.411102, CubicLattice::FaceCentered, 0.5),
        },
        Calibrant {
            name: "Si".to_string(),
            d_spacings: cubic_d_spacings(5.431179, CubicLattice::Diamond, 0.5),
        },
    ]
});

impl Calibrant {
    /// Create a calibrant, sorting the d-spacings from large to small
    pub fn new(name: &str, mut d_spacings: Vec<f64>) -> Self {
        d_spacings.retain(|d| d.is_finite() && *d > 0.0);
        d_spacings.sort_by(|a, b| b.total_cmp(a));
        Self {
            name: name.to_string(),
            d_spacings,
        }
    }

    /// Names of the calibrants that ship with the crate
    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.iter().map(|c| c.name.as_str()).collect()
    }

    /// Load a `.D` file: one d-spacing per line, `#` starts a comment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "calibrant".to_string());

        let mut d_spacings = Vec::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            let d = first.parse::<f64>().map_err(|_| {
                GeometryError::FormatError(format!("{}:{}: bad d-spacing '{}'", path.display(), n + 1, first))
            })?;
            d_spacings.push(d);
        }
        if d_spacings.is_empty() {
            return Err(GeometryError::FormatError(format!(
                "{} contains no d-spacings",
                path.display()
            )));
        }
        Ok(Self::new(&name, d_spacings))
    }

    /// Calibrant directory, `$DIOPTAS_DATA_DIR/calibrants` when set
    pub fn data_dir() -> Option<PathBuf> {
        env::var_os(DATA_DIR_ENV).map(|dir| PathBuf::from(dir).join("calibrants"))
    }

    /// Look up a calibrant by name, preferring files in the data directory
    pub fn by_name(name: &str) -> Result<Self> {
        if let Some(dir) = Self::data_dir() {
            let file = dir.join(format!("{}.D", name));
            if file.is_file() {
                return Self::from_file(file);
            }
        }
        BUILTIN
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| GeometryError::UnknownCalibrant(name.to_string()))
    }

    /// Two-theta in radians of every reachable ring at wavelength λ (Angstrom)
    pub fn two_theta(&self, wavelength: f64) -> Vec<f64> {
        self.d_spacings
            .iter()
            .map(|&d| wavelength / (2.0 * d))
            .take_while(|&s| s <= 1.0)
            .map(|s| 2.0 * s.asin())
            .collect()
    }

    /// Two-theta in radians of ring `index`, if it exists at λ
    pub fn ring_two_theta(&self, index: usize, wavelength: f64) -> Option<f64> {
        let d = *self.d_spacings.get(index)?;
        let s = wavelength / (2.0 * d);
        (s <= 1.0).then(|| 2.0 * s.asin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_lab6_first_rings() {
        let lab6 = Calibrant::by_name("LaB6").unwrap();
        assert_relative_eq!(lab6.d_spacings[0], 4.15689, epsilon = 1e-12);
        assert_relative_eq!(lab6.d_spacings[1], 4.15689 / 2f64.sqrt(), epsilon = 1e-12);
        // h² + k² + l² = 7 is not a sum of three squares
        assert_relative_eq!(lab6.d_spacings[6], 4.15689 / 8f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_silicon_extinctions() {
        let si = Calibrant::by_name("si").unwrap();
        let a = 5.431179;
        let expected = [3.0, 8.0, 11.0, 16.0, 19.0];
        for (d, n) in si.d_spacings.iter().zip(expected) {
            assert_relative_eq!(*d, a / f64::sqrt(n), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_load_d_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Custom.D");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# custom calibrant").unwrap();
        writeln!(file, "2.0  100").unwrap();
        writeln!(file, "3.0").unwrap();
        let calibrant = Calibrant::from_file(&path).unwrap();
        assert_eq!(calibrant.name, "Custom");
        assert_eq!(calibrant.d_spacings, vec![3.0, 2.0]);
    }

    #[test]
    fn test_two_theta_stops_at_unreachable() {
        let calibrant = Calibrant::new("x", vec![2.0, 1.0, 0.2]);
        let tth = calibrant.two_theta(1.0);
        assert_eq!(tth.len(), 2);
        assert_relative_eq!(tth[0], 2.0 * (0.25f64).asin(), epsilon = 1e-12);
        assert!(calibrant.ring_two_theta(2, 1.0).is_none());
    }

    #[test]
    fn test_unknown_calibrant() {
        assert!(matches!(
            Calibrant::by_name("unobtainium"),
            Err(GeometryError::UnknownCalibrant(_))
        ));
    }
}
