/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Crystallographic symmetry operations in `x,y,z` notation

use super::errors::{PhaseError, Result};

/// Tolerance for treating fractional coordinates as equal
pub const POSITION_TOLERANCE: f64 = 1e-4;

/// Affine operation r' = R·r + t on fractional coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryOperation {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl SymmetryOperation {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Parse an operation such as `-x+1/2, y, -z` or `x-y,x,z+0.25`
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
            .collect();
        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() != 3 {
            return Err(PhaseError::InvalidSymmetryOperation(text.to_string()));
        }
        let mut op = Self {
            rotation: [[0.0; 3]; 3],
            translation: [0.0; 3],
        };
        for (row, part) in parts.iter().enumerate() {
            let (coefficients, shift) = parse_component(part)
                .ok_or_else(|| PhaseError::InvalidSymmetryOperation(text.to_string()))?;
            op.rotation[row] = coefficients;
            op.translation[row] = shift;
        }
        Ok(op)
    }

    /// Apply to a fractional position, wrapped into [0, 1)
    pub fn apply(&self, position: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (i, value) in out.iter_mut().enumerate() {
            let r = &self.rotation[i];
            *value = wrap_unit(
                r[0] * position[0] + r[1] * position[1] + r[2] * position[2] + self.translation[i],
            );
        }
        out
    }
}

/// Parse one component, e.g. `-x+1/2`, into coefficients of x, y, z and a shift
fn parse_component(text: &str) -> Option<([f64; 3], f64)> {
    if text.is_empty() {
        return None;
    }
    let mut coefficients = [0.0; 3];
    let mut shift = 0.0;
    // Split into signed terms
    let mut terms = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if (c == '+' || c == '-') && !current.is_empty() {
            terms.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    terms.push(current);

    for term in terms {
        let (sign, body) = match term.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, term.strip_prefix('+').unwrap_or(&term)),
        };
        let lower = body.to_ascii_lowercase();
        let axis = lower.chars().last().and_then(|c| match c {
            'x' => Some(0),
            'y' => Some(1),
            'z' => Some(2),
            _ => None,
        });
        match axis {
            Some(axis) => {
                let factor = &lower[..lower.len() - 1];
                let factor = factor.strip_suffix('*').unwrap_or(factor);
                let value = if factor.is_empty() {
                    1.0
                } else {
                    parse_number(factor)?
                };
                coefficients[axis] += sign * value;
            }
            None => shift += sign * parse_number(&lower)?,
        }
    }
    Some((coefficients, shift))
}

fn parse_number(text: &str) -> Option<f64> {
    match text.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.parse::<f64>().ok()? / den)
        }
        None => text.parse().ok(),
    }
}

/// Wrap a fractional coordinate into [0, 1), folding values within tolerance of 1 to 0
pub fn wrap_unit(value: f64) -> f64 {
    let wrapped = value - value.floor();
    if (1.0 - wrapped) < POSITION_TOLERANCE {
        0.0
    } else {
        wrapped
    }
}

/// Whether two fractional positions coincide modulo lattice translations
pub fn same_site(a: [f64; 3], b: [f64; 3]) -> bool {
    a.iter().zip(&b).all(|(p, q)| {
        let d = (p - q).abs();
        d.min(1.0 - d) < POSITION_TOLERANCE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_identity() {
        assert_eq!(SymmetryOperation::parse("x,y,z").unwrap(), SymmetryOperation::identity());
    }

    #[test]
    fn test_parse_with_translation() {
        let op = SymmetryOperation::parse("'-x+1/2, y, -z+0.25'").unwrap();
        let r = op.apply([0.1, 0.2, 0.3]);
        assert_relative_eq!(r[0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.2, epsilon = 1e-12);
        assert_relative_eq!(r[2], 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_hexagonal_and_leading_shift() {
        let op = SymmetryOperation::parse("x-y, x, 1/2+z").unwrap();
        assert_eq!(op.rotation[0], [1.0, -1.0, 0.0]);
        let r = op.apply([0.5, 0.25, 0.75]);
        assert_relative_eq!(r[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(r[2], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_operations() {
        assert!(SymmetryOperation::parse("x,y").is_err());
        assert!(SymmetryOperation::parse("x,y,q").is_err());
        assert!(SymmetryOperation::parse("x,y,z+1/0").is_err());
    }

    #[test]
    fn test_same_site_wraps() {
        assert!(same_site([0.99995, 0.5, 0.0], [0.0, 0.5, 0.0]));
        assert!(!same_site([0.1, 0.5, 0.0], [0.0, 0.5, 0.0]));
    }
}
