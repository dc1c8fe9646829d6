/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! CIF phases
//!
//! Reads the first data block of a CIF file: cell, space group, symmetry
//! operations and the asymmetric unit. Atoms are expanded to the full unit
//! cell and kinematic powder intensities are computed from the structure
//! factor.

use num_complex::Complex64;
use rayon::prelude::*;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use super::database::element_from_label;
use super::eos::EquationOfState;
use super::errors::{PhaseError, Result};
use super::jcpds::{CrystalSystem, Jcpds, Reflection, UnitCell};
use super::scattering::scattering_factor;
use super::symmetry::{same_site, SymmetryOperation};
use crate::utils::conversions::d_to_tth;

/// Reflections closer than this in d (Å) are merged into one line
const D_MERGE_TOLERANCE: f64 = 1e-5;
/// Normalized intensities at or below this are systematic absences
const ABSENCE_THRESHOLD: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Data,
    Loop,
    Tag(String),
    Value(String),
}

fn classify(word: String) -> Token {
    let lower = word.to_ascii_lowercase();
    if lower.starts_with("data_") {
        Token::Data
    } else if lower == "loop_" {
        Token::Loop
    } else if word.starts_with('_') {
        Token::Tag(lower)
    } else {
        Token::Value(word)
    }
}

fn tokenize(content: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        if let Some(first) = line.strip_prefix(';') {
            // Semicolon text field
            let mut text = first.to_string();
            let mut closed = false;
            for next in lines.by_ref() {
                if next.starts_with(';') {
                    closed = true;
                    break;
                }
                text.push('\n');
                text.push_str(next);
            }
            if !closed {
                return Err(PhaseError::FormatError("unterminated text field".to_string()));
            }
            tokens.push(Token::Value(text.trim().to_string()));
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
            } else if c == '#' {
                break;
            } else if c == '\'' || c == '"' {
                // A quote only closes when followed by whitespace or the line end
                let start = i + 1;
                let mut end = start;
                while end < chars.len()
                    && !(chars[end] == c
                        && chars.get(end + 1).map_or(true, |n| n.is_whitespace()))
                {
                    end += 1;
                }
                tokens.push(Token::Value(chars[start..end.min(chars.len())].iter().collect()));
                i = end + 1;
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                tokens.push(classify(chars[start..i].iter().collect()));
            }
        }
    }
    Ok(tokens)
}

/// Tags and loops of one data block
#[derive(Debug, Default)]
struct CifBlock {
    items: HashMap<String, String>,
    loops: Vec<(Vec<String>, Vec<Vec<String>>)>,
}

impl CifBlock {
    fn parse(content: &str) -> Result<Self> {
        let tokens = tokenize(content)?;
        let mut block = CifBlock::default();
        let mut seen_data = false;
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Data => {
                    if seen_data {
                        break;
                    }
                    seen_data = true;
                    i += 1;
                }
                Token::Tag(tag) => match tokens.get(i + 1) {
                    Some(Token::Value(value)) => {
                        block.items.insert(tag.clone(), value.clone());
                        i += 2;
                    }
                    _ => {
                        return Err(PhaseError::FormatError(format!("tag {} has no value", tag)))
                    }
                },
                Token::Loop => {
                    i += 1;
                    let mut tags = Vec::new();
                    while let Some(Token::Tag(tag)) = tokens.get(i) {
                        tags.push(tag.clone());
                        i += 1;
                    }
                    let mut values = Vec::new();
                    while let Some(Token::Value(value)) = tokens.get(i) {
                        values.push(value.clone());
                        i += 1;
                    }
                    if tags.is_empty() || values.len() % tags.len() != 0 {
                        return Err(PhaseError::FormatError(format!(
                            "loop with {} tags has {} values",
                            tags.len(),
                            values.len()
                        )));
                    }
                    let rows = values.chunks(tags.len()).map(<[String]>::to_vec).collect();
                    block.loops.push((tags, rows));
                }
                Token::Value(value) => {
                    return Err(PhaseError::FormatError(format!("unexpected value '{}'", value)))
                }
            }
        }
        Ok(block)
    }

    fn number(&self, tag: &str) -> Option<f64> {
        self.items.get(tag).and_then(|v| cif_number(v))
    }

    /// Column values of the loop that contains `tag`
    fn column(&self, tag: &str) -> Option<Vec<String>> {
        self.loops.iter().find_map(|(tags, rows)| {
            let index = tags.iter().position(|t| t == tag)?;
            Some(rows.iter().map(|row| row[index].clone()).collect())
        })
    }
}

/// Parse a CIF number, dropping a standard uncertainty such as `4.1569(2)`
fn cif_number(value: &str) -> Option<f64> {
    let value = value.split('(').next()?.trim();
    if value == "." || value == "?" {
        return None;
    }
    value.parse().ok()
}

/// One atom site
#[derive(Debug, Clone, PartialEq)]
pub struct CifAtom {
    pub label: String,
    pub element: String,
    pub position: [f64; 3],
    pub occupancy: f64,
}

/// A kinematic powder line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CifReflection {
    pub h: i32,
    pub k: i32,
    pub l: i32,
    pub d: f64,
    pub two_theta: f64,
    pub multiplicity: usize,
    /// Normalized to 100 for the strongest line
    pub intensity: f64,
}

/// Structure read from a CIF file
#[derive(Debug, Clone, PartialEq)]
pub struct CifPhase {
    pub name: String,
    pub cell: UnitCell,
    pub space_group: Option<u32>,
    pub operations: Vec<SymmetryOperation>,
    pub atoms: Vec<CifAtom>,
}

impl CifPhase {
    /// Parse the first data block of `content`
    pub fn parse(content: &str, name: &str) -> Result<Self> {
        let block = CifBlock::parse(content)?;
        let cell_value = |tag: &str| {
            block
                .number(tag)
                .ok_or_else(|| PhaseError::FormatError(format!("missing {}", tag)))
        };
        let cell = UnitCell::new(
            cell_value("_cell_length_a")?,
            cell_value("_cell_length_b")?,
            cell_value("_cell_length_c")?,
            cell_value("_cell_angle_alpha")?,
            cell_value("_cell_angle_beta")?,
            cell_value("_cell_angle_gamma")?,
        );
        let space_group = ["_space_group_it_number", "_symmetry_int_tables_number"]
            .iter()
            .find_map(|tag| block.number(tag))
            .map(|n| n as u32);

        let operations = match ["_space_group_symop_operation_xyz", "_symmetry_equiv_pos_as_xyz"]
            .iter()
            .find_map(|tag| block.column(tag))
        {
            Some(ops) => ops
                .iter()
                .map(|op| SymmetryOperation::parse(op))
                .collect::<Result<Vec<_>>>()?,
            None => vec![SymmetryOperation::identity()],
        };

        let labels = block
            .column("_atom_site_label")
            .ok_or_else(|| PhaseError::FormatError("missing _atom_site_label".to_string()))?;
        let coordinate = |tag: &str| {
            block
                .column(tag)
                .ok_or_else(|| PhaseError::FormatError(format!("missing {}", tag)))
        };
        let xs = coordinate("_atom_site_fract_x")?;
        let ys = coordinate("_atom_site_fract_y")?;
        let zs = coordinate("_atom_site_fract_z")?;
        let types = block.column("_atom_site_type_symbol");
        let occupancies = block.column("_atom_site_occupancy");
        let consistent = [Some(&xs), Some(&ys), Some(&zs), types.as_ref(), occupancies.as_ref()]
            .iter()
            .flatten()
            .all(|column| column.len() == labels.len());
        if !consistent {
            return Err(PhaseError::FormatError(
                "atom site columns have different lengths".to_string(),
            ));
        }

        let mut atoms = Vec::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            let type_label = types.as_ref().map_or(label.as_str(), |t| t[i].as_str());
            let element = element_from_label(type_label)
                .or_else(|| element_from_label(label))
                .ok_or_else(|| {
                    PhaseError::FormatError(format!("cannot resolve element of {}", label))
                })?;
            let position = [&xs[i], &ys[i], &zs[i]].map(|v| cif_number(v));
            let [Some(x), Some(y), Some(z)] = position else {
                return Err(PhaseError::FormatError(format!(
                    "invalid coordinates for {}",
                    label
                )));
            };
            let occupancy = occupancies
                .as_ref()
                .and_then(|o| cif_number(&o[i]))
                .unwrap_or(1.0);
            atoms.push(CifAtom {
                label: label.clone(),
                element: element.to_string(),
                position: [x, y, z],
                occupancy,
            });
        }
        if atoms.is_empty() {
            return Err(PhaseError::FormatError("no atom sites".to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            cell,
            space_group,
            operations,
            atoms,
        })
    }

    /// Read a CIF file; the name is the file stem
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::parse(&content, name)
    }

    /// All atoms of the unit cell
    ///
    /// Every operation is applied to every site; images of the same site
    /// closer than the position tolerance are kept once.
    pub fn unit_cell_atoms(&self) -> Vec<CifAtom> {
        let mut expanded: Vec<CifAtom> = Vec::new();
        for atom in &self.atoms {
            for op in &self.operations {
                let position = op.apply(atom.position);
                let duplicate = expanded
                    .iter()
                    .any(|a| a.label == atom.label && same_site(a.position, position));
                if !duplicate {
                    expanded.push(CifAtom {
                        position,
                        ..atom.clone()
                    });
                }
            }
        }
        expanded
    }

    /// Crystal system from the space group and cell shape
    pub fn crystal_system(&self) -> CrystalSystem {
        let c = &self.cell;
        let rhombohedral = (c.a - c.b).abs() < 1e-6
            && (c.a - c.c).abs() < 1e-6
            && (c.alpha - 90.0).abs() > 1e-6
            && (c.alpha - c.beta).abs() < 1e-6
            && (c.alpha - c.gamma).abs() < 1e-6;
        self.space_group
            .and_then(|n| CrystalSystem::from_space_group(n, rhombohedral))
            .unwrap_or(CrystalSystem::Triclinic)
    }

    /// Powder lines with d ≥ `d_min` reachable at `wavelength`
    ///
    /// # Arguments
    ///
    /// * `wavelength` - X-ray wavelength in Å
    /// * `d_min` - Smallest d-spacing in Å
    /// * `min_intensity` - Lines below this normalized intensity are dropped
    pub fn reflections(&self, wavelength: f64, d_min: f64, min_intensity: f64) -> Vec<CifReflection> {
        let d_min = d_min.max(wavelength / 2.0);
        if d_min <= 0.0 || !d_min.is_finite() {
            return Vec::new();
        }
        let atoms = self.unit_cell_atoms();
        let cell = self.cell;
        let bound = |length: f64| (length / d_min).floor() as i32;
        let (hm, km, lm) = (bound(cell.a), bound(cell.b), bound(cell.c));

        let indices: Vec<(i32, i32, i32)> = (-hm..=hm)
            .flat_map(|h| (-km..=km).flat_map(move |k| (-lm..=lm).map(move |l| (h, k, l))))
            .filter(|&hkl| hkl != (0, 0, 0))
            .collect();

        let mut lines: Vec<((i32, i32, i32), f64, f64)> = indices
            .par_iter()
            .filter_map(|&(h, k, l)| {
                let d = cell.d_spacing(h, k, l);
                if d.is_nan() || d < d_min {
                    return None;
                }
                let s = 1.0 / (2.0 * d);
                let f: Complex64 = atoms
                    .iter()
                    .map(|a| {
                        let phase = 2.0
                            * PI
                            * (h as f64 * a.position[0]
                                + k as f64 * a.position[1]
                                + l as f64 * a.position[2]);
                        Complex64::from_polar(scattering_factor(&a.element, s) * a.occupancy, phase)
                    })
                    .sum();
                Some(((h, k, l), d, f.norm_sqr()))
            })
            .collect();
        lines.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));

        // Merge lines of equal d, labelled by the largest (h, k, l)
        let mut merged: Vec<CifReflection> = Vec::new();
        for ((h, k, l), d, f2) in lines {
            let theta = d_to_tth(d, wavelength).to_radians() / 2.0;
            let lorentz = (1.0 + (2.0 * theta).cos().powi(2))
                / (theta.sin().powi(2) * theta.cos());
            if !lorentz.is_finite() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if (last.d - d).abs() < D_MERGE_TOLERANCE => {
                    last.multiplicity += 1;
                    last.intensity += f2 * lorentz;
                    if (h, k, l) > (last.h, last.k, last.l) {
                        (last.h, last.k, last.l) = (h, k, l);
                    }
                }
                _ => merged.push(CifReflection {
                    h,
                    k,
                    l,
                    d,
                    two_theta: 2.0 * theta.to_degrees(),
                    multiplicity: 1,
                    intensity: f2 * lorentz,
                }),
            }
        }

        let max = merged.iter().map(|r| r.intensity).fold(0.0, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }
        merged
            .into_iter()
            .map(|mut r| {
                r.intensity *= 100.0 / max;
                r
            })
            .filter(|r| r.intensity > ABSENCE_THRESHOLD && r.intensity >= min_intensity)
            .collect()
    }

    /// Convert to a jcpds phase at the reference state
    ///
    /// The reflection list holds the kinematic lines; the EOS is empty.
    pub fn to_jcpds(&self, wavelength: f64, d_min: f64, min_intensity: f64) -> Result<Jcpds> {
        let system = self.crystal_system();
        let cell = UnitCell::from_independent(system, &self.cell.independent(system))?;
        let reflections: Vec<Reflection> = self
            .reflections(wavelength, d_min, min_intensity)
            .iter()
            .map(|r| Reflection::new(r.h, r.k, r.l, r.d, r.intensity))
            .collect();
        if reflections.is_empty() {
            return Err(PhaseError::FormatError(format!(
                "{} has no reflections above d = {} Å",
                self.name, d_min
            )));
        }
        let mut jcpds = Jcpds::new(&self.name, system, cell, EquationOfState::default(), reflections);
        jcpds.comments.push(format!("converted from CIF {}", self.name));
        Ok(jcpds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const COPPER: &str = "data_Cu
_cell_length_a 3.6149(2)
_cell_length_b 3.6149(2)
_cell_length_c 3.6149(2)
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
_symmetry_Int_Tables_number 225
_publ_section_title
;
Copper, face centred
;
loop_
_symmetry_equiv_pos_as_xyz
'x, y, z'
'x+1/2, y+1/2, z'
'x+1/2, y, z+1/2'
'x, y+1/2, z+1/2'
'-x, -y, -z'
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_occupancy
Cu1 0.0 0.0 0.0 1.0
";

    #[test]
    fn test_parse() {
        let phase = CifPhase::parse(COPPER, "cu").unwrap();
        assert_relative_eq!(phase.cell.a, 3.6149);
        assert_eq!(phase.space_group, Some(225));
        assert_eq!(phase.operations.len(), 5);
        assert_eq!(phase.atoms[0].element, "Cu");
        assert_eq!(phase.crystal_system(), CrystalSystem::Cubic);
    }

    #[test]
    fn test_expansion_removes_duplicates() {
        let phase = CifPhase::parse(COPPER, "cu").unwrap();
        assert_eq!(phase.unit_cell_atoms().len(), 4);
    }

    #[test]
    fn test_fcc_extinctions_and_multiplicity() {
        let phase = CifPhase::parse(COPPER, "cu").unwrap();
        let lines = phase.reflections(0.4, 1.0, 0.0);
        let first = &lines[0];
        assert_eq!((first.h, first.k, first.l), (1, 1, 1));
        assert_eq!(first.multiplicity, 8);
        assert_relative_eq!(first.intensity, 100.0);
        assert_eq!((lines[1].h, lines[1].k, lines[1].l), (2, 0, 0));
        assert_eq!(lines[1].multiplicity, 6);
        assert!(lines[1].intensity < 100.0);
        // (100) and (110) are extinct for a face centred lattice
        assert!(lines.iter().all(|r| (r.d - 3.6149).abs() > 1e-3));
        assert!(lines.iter().all(|r| (r.d - 3.6149 / 2f64.sqrt()).abs() > 1e-3));
    }

    #[test]
    fn test_min_intensity_cut() {
        let phase = CifPhase::parse(COPPER, "cu").unwrap();
        let all = phase.reflections(0.4, 0.8, 0.0);
        let strong = phase.reflections(0.4, 0.8, 30.0);
        assert!(strong.len() < all.len());
        assert!(strong.iter().all(|r| r.intensity >= 30.0));
    }

    #[test]
    fn test_to_jcpds() {
        let phase = CifPhase::parse(COPPER, "cu").unwrap();
        let jcpds = phase.to_jcpds(0.4, 1.0, 1.0).unwrap();
        assert_eq!(jcpds.symmetry(), CrystalSystem::Cubic);
        assert_relative_eq!(jcpds.reflections()[0].d0, 3.6149 / 3f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_missing_cell_is_rejected() {
        let text = COPPER.replace("_cell_length_b 3.6149(2)\n", "");
        assert!(matches!(CifPhase::parse(&text, "cu"), Err(PhaseError::FormatError(_))));
    }
}
