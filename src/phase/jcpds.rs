/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! jcpds phase files
//!
//! Two layouts are read: the positional layout (version, comment, crystal
//! system, independent cell parameters, three EOS lines and `h k l d₀ I`
//! rows) and the keyword layout of version 4 files (`K0:`, `SYMMETRY:`,
//! `DIHKL:` …). A phase is written back in the layout it was read from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::eos::EquationOfState;
use super::errors::{PhaseError, Result};
use crate::utils::constants::REFERENCE_TEMPERATURE;
use crate::utils::conversions::d_to_tth;

/// The seven crystal systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrystalSystem {
    Cubic,
    Tetragonal,
    Orthorhombic,
    Hexagonal,
    Rhombohedral,
    Monoclinic,
    Triclinic,
}

impl CrystalSystem {
    /// Names of the cell parameters stored for this system
    pub fn independent_parameters(&self) -> &'static [&'static str] {
        match self {
            CrystalSystem::Cubic => &["A"],
            CrystalSystem::Tetragonal | CrystalSystem::Hexagonal => &["A", "C"],
            CrystalSystem::Orthorhombic => &["A", "B", "C"],
            CrystalSystem::Rhombohedral => &["A", "ALPHA"],
            CrystalSystem::Monoclinic => &["A", "B", "C", "BETA"],
            CrystalSystem::Triclinic => &["A", "B", "C", "ALPHA", "BETA", "GAMMA"],
        }
    }

    /// Crystal system of an International Tables space group number
    ///
    /// Trigonal groups map to the hexagonal setting unless `rhombohedral`.
    pub fn from_space_group(number: u32, rhombohedral: bool) -> Option<Self> {
        match number {
            1..=2 => Some(CrystalSystem::Triclinic),
            3..=15 => Some(CrystalSystem::Monoclinic),
            16..=74 => Some(CrystalSystem::Orthorhombic),
            75..=142 => Some(CrystalSystem::Tetragonal),
            143..=167 if rhombohedral => Some(CrystalSystem::Rhombohedral),
            143..=194 => Some(CrystalSystem::Hexagonal),
            195..=230 => Some(CrystalSystem::Cubic),
            _ => None,
        }
    }
}

impl fmt::Display for CrystalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrystalSystem::Cubic => "CUBIC",
            CrystalSystem::Tetragonal => "TETRAGONAL",
            CrystalSystem::Orthorhombic => "ORTHORHOMBIC",
            CrystalSystem::Hexagonal => "HEXAGONAL",
            CrystalSystem::Rhombohedral => "RHOMBOHEDRAL",
            CrystalSystem::Monoclinic => "MONOCLINIC",
            CrystalSystem::Triclinic => "TRICLINIC",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for CrystalSystem {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUBIC" => Ok(CrystalSystem::Cubic),
            "TETRAGONAL" => Ok(CrystalSystem::Tetragonal),
            "ORTHORHOMBIC" => Ok(CrystalSystem::Orthorhombic),
            "HEXAGONAL" => Ok(CrystalSystem::Hexagonal),
            "RHOMBOHEDRAL" | "TRIGONAL" => Ok(CrystalSystem::Rhombohedral),
            "MONOCLINIC" => Ok(CrystalSystem::Monoclinic),
            "TRICLINIC" => Ok(CrystalSystem::Triclinic),
            other => Err(PhaseError::UnknownSymmetry(other.to_string())),
        }
    }
}

/// Lattice parameters in Å and degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        }
    }

    /// Build a cell from the independent parameters of `system`
    ///
    /// `values` follows the order of [`CrystalSystem::independent_parameters`].
    pub fn from_independent(system: CrystalSystem, values: &[f64]) -> Result<Self> {
        let expected = system.independent_parameters().len();
        if values.len() != expected {
            return Err(PhaseError::FormatError(format!(
                "{} cell needs {} parameters, got {}",
                system,
                expected,
                values.len()
            )));
        }
        let cell = match system {
            CrystalSystem::Cubic => Self::new(values[0], values[0], values[0], 90.0, 90.0, 90.0),
            CrystalSystem::Tetragonal => {
                Self::new(values[0], values[0], values[1], 90.0, 90.0, 90.0)
            }
            CrystalSystem::Orthorhombic => {
                Self::new(values[0], values[1], values[2], 90.0, 90.0, 90.0)
            }
            CrystalSystem::Hexagonal => {
                Self::new(values[0], values[0], values[1], 90.0, 90.0, 120.0)
            }
            CrystalSystem::Rhombohedral => {
                Self::new(values[0], values[0], values[0], values[1], values[1], values[1])
            }
            CrystalSystem::Monoclinic => {
                Self::new(values[0], values[1], values[2], 90.0, values[3], 90.0)
            }
            CrystalSystem::Triclinic => Self::new(
                values[0], values[1], values[2], values[3], values[4], values[5],
            ),
        };
        if cell.volume().is_nan() || cell.volume() <= 0.0 {
            return Err(PhaseError::InvalidParameter(format!(
                "cell {:?} has no volume",
                cell
            )));
        }
        Ok(cell)
    }

    /// Independent parameter values for `system`
    pub fn independent(&self, system: CrystalSystem) -> Vec<f64> {
        system
            .independent_parameters()
            .iter()
            .map(|name| match *name {
                "A" => self.a,
                "B" => self.b,
                "C" => self.c,
                "ALPHA" => self.alpha,
                "BETA" => self.beta,
                _ => self.gamma,
            })
            .collect()
    }

    /// Metric tensor G
    fn metric(&self) -> [[f64; 3]; 3] {
        let (ca, cb, cg) = (
            self.alpha.to_radians().cos(),
            self.beta.to_radians().cos(),
            self.gamma.to_radians().cos(),
        );
        [
            [self.a * self.a, self.a * self.b * cg, self.a * self.c * cb],
            [self.a * self.b * cg, self.b * self.b, self.b * self.c * ca],
            [self.a * self.c * cb, self.b * self.c * ca, self.c * self.c],
        ]
    }

    /// Cell volume in Å³
    pub fn volume(&self) -> f64 {
        let g = self.metric();
        let det = g[0][0] * (g[1][1] * g[2][2] - g[1][2] * g[2][1])
            - g[0][1] * (g[1][0] * g[2][2] - g[1][2] * g[2][0])
            + g[0][2] * (g[1][0] * g[2][1] - g[1][1] * g[2][0]);
        det.sqrt()
    }

    /// Interplanar spacing of (h k l)
    pub fn d_spacing(&self, h: i32, k: i32, l: i32) -> f64 {
        let g = self.metric();
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            g[r0][c0] * g[r1][c1] - g[r0][c1] * g[r1][c0]
        };
        // Reciprocal metric from the adjugate
        let inv = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ];
        let det = g[0][0] * inv[0][0] + g[0][1] * inv[1][0] + g[0][2] * inv[2][0];
        let v = [h as f64, k as f64, l as f64];
        let mut inv_d2 = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                inv_d2 += v[i] * inv[i][j] * v[j];
            }
        }
        (det / inv_d2).sqrt()
    }

    /// Isotropically scaled copy with volume `volume`
    pub fn scaled_to_volume(&self, volume: f64) -> Self {
        let factor = (volume / self.volume()).cbrt();
        Self {
            a: self.a * factor,
            b: self.b * factor,
            c: self.c * factor,
            ..*self
        }
    }
}

/// One line of the reflection list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub h: i32,
    pub k: i32,
    pub l: i32,
    /// d at the reference state, Å
    pub d0: f64,
    pub intensity: f64,
    /// d at the current pressure and temperature, Å
    pub d: f64,
}

impl Reflection {
    pub fn new(h: i32, k: i32, l: i32, d0: f64, intensity: f64) -> Self {
        Self {
            h,
            k,
            l,
            d0,
            intensity,
            d: d0,
        }
    }
}

/// Layout a jcpds file was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JcpdsFormat {
    Positional,
    Keyword,
}

/// A phase with an equation of state and a reflection list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jcpds {
    pub name: String,
    pub version: u32,
    pub comments: Vec<String>,
    format: JcpdsFormat,
    symmetry: CrystalSystem,
    cell0: UnitCell,
    cell: UnitCell,
    eos: EquationOfState,
    reflections: Vec<Reflection>,
    pressure: f64,
    temperature: f64,
}

fn numbers(line: &str, expected: usize, what: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| PhaseError::FormatError(format!("{}: cannot parse '{}'", what, line)))?;
    if values.len() < expected {
        return Err(PhaseError::FormatError(format!(
            "{}: expected {} values, got {} in '{}'",
            what,
            expected,
            values.len(),
            line
        )));
    }
    Ok(values)
}

impl Jcpds {
    /// Create a phase at the reference state
    pub fn new(
        name: &str,
        symmetry: CrystalSystem,
        cell: UnitCell,
        eos: EquationOfState,
        reflections: Vec<Reflection>,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: 4,
            comments: Vec::new(),
            format: JcpdsFormat::Keyword,
            symmetry,
            cell0: cell,
            cell,
            eos,
            reflections,
            pressure: 0.0,
            temperature: REFERENCE_TEMPERATURE,
        }
    }

    /// Parse either layout
    pub fn parse(content: &str, name: &str) -> Result<Self> {
        let first = content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| PhaseError::FormatError("empty file".to_string()))?;
        if first.to_ascii_uppercase().starts_with("VERSION:") {
            Self::parse_keyword(content, name)
        } else {
            Self::parse_positional(content, name)
        }
    }

    fn parse_positional(content: &str, name: &str) -> Result<Self> {
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
        let mut next = |what: &str| {
            lines
                .next()
                .ok_or_else(|| PhaseError::FormatError(format!("missing {}", what)))
        };
        let version = next("version")?
            .parse::<u32>()
            .map_err(|_| PhaseError::FormatError("version is not an integer".to_string()))?;
        let comment = next("comment")?.to_string();
        let symmetry: CrystalSystem = next("crystal system")?.parse()?;

        let count = symmetry.independent_parameters().len();
        let mut cell_values = Vec::with_capacity(count);
        while cell_values.len() < count {
            cell_values.extend(numbers(next("cell parameters")?, 1, "cell")?);
        }
        if cell_values.len() != count {
            return Err(PhaseError::FormatError(format!(
                "{} cell needs {} parameters, got {}",
                symmetry,
                count,
                cell_values.len()
            )));
        }
        let cell = UnitCell::from_independent(symmetry, &cell_values)?;

        let moduli = numbers(next("bulk modulus")?, 2, "K0 K0'")?;
        let expansion = numbers(next("thermal expansion")?, 2, "alpha dalpha/dT")?;
        let derivatives = numbers(next("modulus derivatives")?, 2, "dK/dT dK'/dT")?;
        let eos = EquationOfState {
            k0: moduli[0],
            k0p: moduli[1],
            alpha_t0: expansion[0],
            d_alpha_dt: expansion[1],
            dk0_dt: derivatives[0],
            dk0p_dt: derivatives[1],
        };

        let mut reflections = Vec::new();
        for line in lines {
            let v = numbers(line, 5, "reflection")?;
            reflections.push(Reflection::new(v[0] as i32, v[1] as i32, v[2] as i32, v[3], v[4]));
        }
        if reflections.is_empty() {
            return Err(PhaseError::FormatError("no reflections".to_string()));
        }

        let mut phase = Self::new(name, symmetry, cell, eos, reflections);
        phase.version = version;
        phase.format = JcpdsFormat::Positional;
        phase.comments = vec![comment];
        Ok(phase)
    }

    fn parse_keyword(content: &str, name: &str) -> Result<Self> {
        let mut version = 4;
        let mut comments = Vec::new();
        let mut symmetry = None;
        let mut cell_values: Vec<(String, f64)> = Vec::new();
        let mut eos = EquationOfState::default();
        let mut reflections = Vec::new();

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((key, value)) = line.split_once(':') else {
                return Err(PhaseError::FormatError(format!("expected 'KEY: value', got '{}'", line)));
            };
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            let scalar = || numbers(value, 1, &key).map(|v| v[0]);
            match key.as_str() {
                "VERSION" => version = scalar()? as u32,
                "COMMENT" => comments.push(value.to_string()),
                "SYMMETRY" => symmetry = Some(value.parse::<CrystalSystem>()?),
                "A" | "B" | "C" | "ALPHA" | "BETA" | "GAMMA" => {
                    cell_values.push((key.clone(), scalar()?))
                }
                "K0" => eos.k0 = scalar()?,
                "K0P" => eos.k0p = scalar()?,
                "DK0DT" => eos.dk0_dt = scalar()?,
                "DK0PDT" => eos.dk0p_dt = scalar()?,
                "ALPHAT" => eos.alpha_t0 = scalar()?,
                "DALPHADT" => eos.d_alpha_dt = scalar()?,
                "DIHKL" => {
                    let v = numbers(value, 5, "DIHKL")?;
                    reflections.push(Reflection::new(v[2] as i32, v[3] as i32, v[4] as i32, v[0], v[1]));
                }
                other => log::debug!("ignoring jcpds keyword {}", other),
            }
        }

        let symmetry =
            symmetry.ok_or_else(|| PhaseError::FormatError("missing SYMMETRY".to_string()))?;
        let values = symmetry
            .independent_parameters()
            .iter()
            .map(|p| {
                cell_values
                    .iter()
                    .find(|(k, _)| k == p)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| PhaseError::FormatError(format!("missing {}", p)))
            })
            .collect::<Result<Vec<f64>>>()?;
        let cell = UnitCell::from_independent(symmetry, &values)?;
        if reflections.is_empty() {
            return Err(PhaseError::FormatError("no reflections".to_string()));
        }

        let mut phase = Self::new(name, symmetry, cell, eos, reflections);
        phase.version = version;
        phase.comments = comments;
        Ok(phase)
    }

    /// Read a phase file; the name is the file stem
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::parse(&content, name)
    }

    /// Text of the reference-state phase in its original layout
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match self.format {
            JcpdsFormat::Positional => {
                out.push_str(&format!("{}\n", self.version));
                out.push_str(&format!("{}\n", self.comments.first().map_or("", String::as_str)));
                out.push_str(&format!("{}\n", self.symmetry));
                for value in self.cell0.independent(self.symmetry) {
                    out.push_str(&format!("{}\n", value));
                }
                out.push_str(&format!("{} {}\n", self.eos.k0, self.eos.k0p));
                out.push_str(&format!("{} {}\n", self.eos.alpha_t0, self.eos.d_alpha_dt));
                out.push_str(&format!("{} {}\n", self.eos.dk0_dt, self.eos.dk0p_dt));
                for r in &self.reflections {
                    out.push_str(&format!("{} {} {} {} {}\n", r.h, r.k, r.l, r.d0, r.intensity));
                }
            }
            JcpdsFormat::Keyword => {
                out.push_str(&format!("VERSION: {}\n", self.version));
                for comment in &self.comments {
                    out.push_str(&format!("COMMENT: {}\n", comment));
                }
                out.push_str(&format!("K0: {}\n", self.eos.k0));
                out.push_str(&format!("K0P: {}\n", self.eos.k0p));
                out.push_str(&format!("DK0DT: {}\n", self.eos.dk0_dt));
                out.push_str(&format!("DK0PDT: {}\n", self.eos.dk0p_dt));
                out.push_str(&format!("SYMMETRY: {}\n", self.symmetry));
                let names = self.symmetry.independent_parameters();
                for (name, value) in names.iter().zip(self.cell0.independent(self.symmetry)) {
                    out.push_str(&format!("{}: {}\n", name, value));
                }
                out.push_str(&format!("ALPHAT: {}\n", self.eos.alpha_t0));
                out.push_str(&format!("DALPHADT: {}\n", self.eos.d_alpha_dt));
                for r in &self.reflections {
                    out.push_str(&format!(
                        "DIHKL: {} {} {} {} {}\n",
                        r.d0, r.intensity, r.h, r.k, r.l
                    ));
                }
            }
        }
        out
    }

    /// Write the phase, atomically
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("jcpds.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(self.to_text().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn format(&self) -> JcpdsFormat {
        self.format
    }

    pub fn symmetry(&self) -> CrystalSystem {
        self.symmetry
    }

    /// Reference cell
    pub fn cell0(&self) -> &UnitCell {
        &self.cell0
    }

    /// Cell at the current pressure and temperature
    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn eos(&self) -> &EquationOfState {
        &self.eos
    }

    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn v0(&self) -> f64 {
        self.cell0.volume()
    }

    pub fn volume(&self) -> f64 {
        self.cell.volume()
    }

    /// Move the phase to (P, T)
    ///
    /// On `EosSolve` the previous pressure, temperature and cell are kept.
    pub fn set_pressure_temperature(&mut self, pressure: f64, temperature: f64) -> Result<()> {
        let volume = self.eos.volume(self.v0(), pressure, temperature)?;
        self.pressure = pressure;
        self.temperature = temperature;
        self.cell = self.cell0.scaled_to_volume(volume);
        self.update_d();
        Ok(())
    }

    pub fn set_pressure(&mut self, pressure: f64) -> Result<()> {
        self.set_pressure_temperature(pressure, self.temperature)
    }

    pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        self.set_pressure_temperature(self.pressure, temperature)
    }

    fn update_d(&mut self) {
        let (cell0, cell) = (self.cell0, self.cell);
        let at_reference = cell0 == cell;
        for r in &mut self.reflections {
            if at_reference {
                r.d = r.d0;
                continue;
            }
            let ratio = cell.d_spacing(r.h, r.k, r.l) / cell0.d_spacing(r.h, r.k, r.l);
            r.d = if ratio.is_finite() { r.d0 * ratio } else { r.d0 };
        }
    }

    /// Replace every d₀ with the value computed from h, k, l and the reference cell
    pub fn compute_d0_from_cell(&mut self) {
        let cell0 = self.cell0;
        for r in &mut self.reflections {
            let d = cell0.d_spacing(r.h, r.k, r.l);
            if d.is_finite() {
                r.d0 = d;
            }
        }
        self.update_d();
    }

    pub fn add_reflection(&mut self, h: i32, k: i32, l: i32, d0: f64, intensity: f64) {
        let mut reflection = Reflection::new(h, k, l, d0, intensity);
        reflection.d = d0 * self.cell.d_spacing(h, k, l) / self.cell0.d_spacing(h, k, l);
        if !reflection.d.is_finite() {
            reflection.d = d0;
        }
        self.reflections.push(reflection);
    }

    pub fn remove_reflection(&mut self, index: usize) -> Result<Reflection> {
        if index >= self.reflections.len() {
            return Err(PhaseError::InvalidParameter(format!(
                "no reflection at index {}",
                index
            )));
        }
        Ok(self.reflections.remove(index))
    }

    /// 2θ in degrees of every reflection at `wavelength` Å; NaN when unreachable
    pub fn two_theta(&self, wavelength: f64) -> Vec<f64> {
        self.reflections
            .iter()
            .map(|r| d_to_tth(r.d, wavelength))
            .collect()
    }
}
