/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Least-squares refinement of the geometry against picked ring points
//!
//! The cost is Σ (2θ_observed − 2θ_ring)² over all picked points. It is
//! minimized with Levenberg-Marquardt on parameters scaled to order one,
//! using a central-difference Jacobian.

use faer::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::calibrant::Calibrant;
use super::errors::{GeometryError, Result};
use super::parameters::GeometryParameters;
use super::projection::{rotation_matrix, tth_chi, Geometry};
use crate::utils::linear_algebra::cholesky_solve;

/// Minimum number of points accepted by the refinement
pub const MIN_POINTS: usize = 6;

/// Points picked on one Debye ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingGroup {
    /// Index into the calibrant's d-spacing list
    pub ring_index: usize,
    /// (row, col) pixel coordinates
    pub points: Vec<(f64, f64)>,
}

/// Picked points grouped by ring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickedRingPoints {
    groups: Vec<RingGroup>,
}

impl PickedRingPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point to the group of `ring_index`, creating the group if needed
    pub fn add_point(&mut self, ring_index: usize, row: f64, col: f64) {
        match self.groups.iter_mut().find(|g| g.ring_index == ring_index) {
            Some(group) => group.points.push((row, col)),
            None => self.groups.push(RingGroup {
                ring_index,
                points: vec![(row, col)],
            }),
        }
    }

    /// Add several points of one ring
    pub fn add_points(&mut self, ring_index: usize, points: &[(f64, f64)]) {
        for &(row, col) in points {
            self.add_point(ring_index, row, col);
        }
    }

    /// Remove the most recently added group
    pub fn remove_last_group(&mut self) -> Option<RingGroup> {
        self.groups.pop()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn groups(&self) -> &[RingGroup] {
        &self.groups
    }

    /// Total number of points over all groups
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.points.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `ring,row,col` records from a CSV file with a header line
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_path(path.as_ref())
            .map_err(|e| GeometryError::FormatError(e.to_string()))?;
        let mut picked = Self::new();
        for record in reader.deserialize::<(usize, f64, f64)>() {
            let (ring, row, col) = record.map_err(|e| GeometryError::FormatError(e.to_string()))?;
            picked.add_point(ring, row, col);
        }
        Ok(picked)
    }

    /// Write the points as `ring,row,col` CSV
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer =
            csv::Writer::from_path(path.as_ref()).map_err(|e| GeometryError::FormatError(e.to_string()))?;
        writer
            .write_record(["ring", "row", "col"])
            .map_err(|e| GeometryError::FormatError(e.to_string()))?;
        for group in &self.groups {
            for &(row, col) in &group.points {
                writer
                    .serialize((group.ring_index, row, col))
                    .map_err(|e| GeometryError::FormatError(e.to_string()))?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Which parameters are free and how the solver iterates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementOptions {
    pub refine_distance: bool,
    pub refine_poni: bool,
    pub refine_rotations: bool,
    /// rot3 does not change 2θ; enabling it makes the problem rank deficient
    pub refine_rot3: bool,
    pub refine_wavelength: bool,
    pub max_iterations: usize,
    /// Stop when the relative cost decrease falls below this value
    pub tolerance: f64,
    /// Supersampling factor of the coordinates in the picked points
    pub supersampling: usize,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            refine_distance: true,
            refine_poni: true,
            refine_rotations: true,
            refine_rot3: false,
            refine_wavelength: false,
            max_iterations: 200,
            tolerance: 1e-14,
            supersampling: 1,
        }
    }
}

/// Outcome of a successful refinement
#[derive(Debug, Clone)]
pub struct RefinementResult {
    pub parameters: GeometryParameters,
    pub iterations: usize,
    /// 2θ residual per point in radians, in group order
    pub residuals: Vec<f64>,
    pub rms_residual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FreeParameter {
    Distance,
    Poni1,
    Poni2,
    Rot1,
    Rot2,
    Rot3,
    Wavelength,
}

impl FreeParameter {
    /// Typical magnitude used to bring every parameter to order one
    fn scale(self) -> f64 {
        match self {
            FreeParameter::Distance => 1e-2,
            FreeParameter::Poni1 | FreeParameter::Poni2 => 1e-3,
            FreeParameter::Rot1 | FreeParameter::Rot2 | FreeParameter::Rot3 => 1e-3,
            FreeParameter::Wavelength => 1e-12,
        }
    }

    fn get(self, p: &GeometryParameters) -> f64 {
        match self {
            FreeParameter::Distance => p.distance,
            FreeParameter::Poni1 => p.poni1,
            FreeParameter::Poni2 => p.poni2,
            FreeParameter::Rot1 => p.rot1,
            FreeParameter::Rot2 => p.rot2,
            FreeParameter::Rot3 => p.rot3,
            FreeParameter::Wavelength => p.wavelength,
        }
    }

    fn set(self, p: &mut GeometryParameters, value: f64) {
        match self {
            FreeParameter::Distance => p.distance = value,
            FreeParameter::Poni1 => p.poni1 = value,
            FreeParameter::Poni2 => p.poni2 = value,
            FreeParameter::Rot1 => p.rot1 = value,
            FreeParameter::Rot2 => p.rot2 = value,
            FreeParameter::Rot3 => p.rot3 = value,
            FreeParameter::Wavelength => p.wavelength = value,
        }
    }
}

fn free_parameters(options: &RefinementOptions) -> Vec<FreeParameter> {
    let mut free = Vec::new();
    if options.refine_distance {
        free.push(FreeParameter::Distance);
    }
    if options.refine_poni {
        free.push(FreeParameter::Poni1);
        free.push(FreeParameter::Poni2);
    }
    if options.refine_rotations {
        free.push(FreeParameter::Rot1);
        free.push(FreeParameter::Rot2);
    }
    if options.refine_rot3 {
        free.push(FreeParameter::Rot3);
    }
    if options.refine_wavelength {
        free.push(FreeParameter::Wavelength);
    }
    free
}

struct Problem<'a> {
    base: GeometryParameters,
    free: Vec<FreeParameter>,
    points: Vec<(f64, f64)>,
    calibrant: &'a Calibrant,
    ring_indices: Vec<usize>,
    supersampling: usize,
}

impl Problem<'_> {
    fn parameters(&self, x: &[f64]) -> GeometryParameters {
        let mut p = self.base;
        for (k, free) in self.free.iter().enumerate() {
            free.set(&mut p, x[k] * free.scale());
        }
        p
    }

    fn residuals(&self, x: &[f64]) -> Result<Vec<f64>> {
        let p = self.parameters(x);
        let m = rotation_matrix(&p);
        let wavelength = p.wavelength_angstrom();
        let mut out = Vec::with_capacity(self.points.len());
        for (&(row, col), &ring) in self.points.iter().zip(&self.ring_indices) {
            let expected = self
                .calibrant
                .ring_two_theta(ring, wavelength)
                .ok_or(GeometryError::NonFinite)?;
            let (tth, _) = tth_chi(&p, &m, row, col, self.supersampling);
            let r = tth - expected;
            if !r.is_finite() {
                return Err(GeometryError::NonFinite);
            }
            out.push(r);
        }
        Ok(out)
    }

    fn jacobian(&self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        let mut columns = Vec::with_capacity(x.len());
        for k in 0..x.len() {
            let h = 1e-6 * x[k].abs().max(1.0);
            let mut xp = x.to_vec();
            let mut xm = x.to_vec();
            xp[k] += h;
            xm[k] -= h;
            let rp = self.residuals(&xp)?;
            let rm = self.residuals(&xm)?;
            columns.push(rp.iter().zip(&rm).map(|(a, b)| (a - b) / (2.0 * h)).collect());
        }
        Ok(columns)
    }
}

fn cost(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Refine `initial` so that picked points land on their calibrant rings
///
/// # Arguments
///
/// * `initial` - Starting parameters; never modified
/// * `picked` - Points grouped by calibrant ring index
/// * `calibrant` - Reference d-spacings
/// * `options` - Free parameters and iteration limits
/// * `cancel` - Optional flag polled between iterations
///
/// # Returns
///
/// The refined parameter set, or a structured error describing why the
/// refinement was rejected.
pub fn refine(
    initial: &GeometryParameters,
    picked: &PickedRingPoints,
    calibrant: &Calibrant,
    options: &RefinementOptions,
    cancel: Option<&AtomicBool>,
) -> Result<RefinementResult> {
    let found = picked.len();
    if found < MIN_POINTS {
        return Err(GeometryError::TooFewPoints {
            found,
            required: MIN_POINTS,
        });
    }
    initial.validate()?;
    let wavelength = initial.wavelength_angstrom();
    if let Some(group) = picked
        .groups()
        .iter()
        .find(|g| calibrant.ring_two_theta(g.ring_index, wavelength).is_none())
    {
        let rings = calibrant.two_theta(wavelength).len();
        return Err(GeometryError::UnknownRing {
            ring: group.ring_index,
            rings,
        });
    }

    let free = free_parameters(options);
    if free.is_empty() {
        return Err(GeometryError::InvalidParameter("no free parameters".to_string()));
    }

    let mut points = Vec::with_capacity(found);
    let mut ring_indices = Vec::with_capacity(found);
    for group in picked.groups() {
        for &(row, col) in &group.points {
            points.push((row, col));
            ring_indices.push(group.ring_index);
        }
    }

    let problem = Problem {
        base: *initial,
        free: free.clone(),
        points,
        calibrant,
        ring_indices,
        supersampling: options.supersampling.max(1),
    };

    let n = free.len();
    let mut x: Vec<f64> = free.iter().map(|f| f.get(initial) / f.scale()).collect();
    let mut r = problem.residuals(&x)?;
    let mut current_cost = cost(&r);
    let mut mu = 1e-3;
    let mut iterations = 0;
    let mut converged = current_cost == 0.0;

    while !converged && iterations < options.max_iterations {
        if cancelled(cancel) {
            log::info!("geometry refinement cancelled after {} iterations", iterations);
            return Err(GeometryError::Cancelled);
        }
        iterations += 1;

        let jac = problem.jacobian(&x)?;
        let mut jtj = Mat::<f64>::zeros(n, n);
        let mut gradient = vec![0.0; n];
        for a in 0..n {
            for b in a..n {
                let v: f64 = jac[a].iter().zip(&jac[b]).map(|(p, q)| p * q).sum();
                jtj[(a, b)] = v;
                jtj[(b, a)] = v;
            }
            gradient[a] = -jac[a].iter().zip(&r).map(|(p, q)| p * q).sum::<f64>();
        }
        check_rank(&jtj, &free)?;

        let mut improved = false;
        while mu <= 1e12 {
            let mut damped = jtj.clone();
            for a in 0..n {
                damped[(a, a)] += mu * jtj[(a, a)];
            }
            let step = match cholesky_solve(&damped, &gradient) {
                Ok(step) => step,
                Err(_) => {
                    mu *= 10.0;
                    continue;
                }
            };
            let trial: Vec<f64> = x.iter().zip(&step).map(|(a, b)| a + b).collect();
            let trial_r = match problem.residuals(&trial) {
                Ok(r) => r,
                Err(GeometryError::NonFinite) => {
                    mu *= 10.0;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let trial_cost = cost(&trial_r);
            if trial_cost < current_cost {
                let decrease = (current_cost - trial_cost) / current_cost;
                x = trial;
                r = trial_r;
                current_cost = trial_cost;
                mu = (mu / 10.0).max(1e-12);
                improved = true;
                if decrease < options.tolerance || current_cost < 1e-28 {
                    converged = true;
                }
                break;
            }
            mu *= 10.0;
        }

        if !improved {
            // No downhill step at any damping: the minimum is reached to machine precision
            converged = true;
        }
        log::debug!("refinement iteration {}: cost {:.3e}, mu {:.1e}", iterations, current_cost, mu);
    }

    if !converged {
        return Err(GeometryError::NotConverged(iterations));
    }

    let parameters = problem.parameters(&x);
    parameters.validate()?;
    let rms_residual = (current_cost / r.len() as f64).sqrt();
    log::info!(
        "geometry refined in {} iterations, rms 2θ residual {:.3e} rad",
        iterations,
        rms_residual
    );
    Ok(RefinementResult {
        parameters,
        iterations,
        residuals: r,
        rms_residual,
    })
}

/// Reject a normal matrix whose normalized form is singular
fn check_rank(jtj: &Mat<f64>, free: &[FreeParameter]) -> Result<()> {
    let n = jtj.nrows();
    let diag: Vec<f64> = (0..n).map(|i| jtj[(i, i)]).collect();
    let largest = diag.iter().copied().fold(0.0, f64::max);
    if let Some(k) = diag
        .iter()
        .position(|&d| !d.is_finite() || d <= 1e-12 * largest)
    {
        return Err(GeometryError::RankDeficient(format!(
            "{:?} has no influence on the residuals",
            free[k]
        )));
    }
    let mut normalized = Mat::<f64>::zeros(n, n);
    for a in 0..n {
        for b in 0..n {
            normalized[(a, b)] = jtj[(a, b)] / (diag[a] * diag[b]).sqrt();
        }
    }
    cholesky_solve(&normalized, &vec![0.0; n])
        .map(|_| ())
        .map_err(|e| GeometryError::RankDeficient(e.to_string()))
}

impl Geometry {
    /// Refine this geometry in place; on any error the parameters are unchanged
    pub fn refine(
        &mut self,
        picked: &PickedRingPoints,
        calibrant: &Calibrant,
        options: &RefinementOptions,
        cancel: Option<&AtomicBool>,
    ) -> Result<RefinementResult> {
        let result = refine(self.parameters(), picked, calibrant, options, cancel)?;
        self.set_parameters(result.parameters)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn true_parameters() -> GeometryParameters {
        GeometryParameters {
            distance: 0.2087,
            poni1: 1024.0 * 172e-6 + 0.0021,
            poni2: 1024.0 * 172e-6 - 0.0013,
            rot1: 0.012,
            rot2: -0.007,
            rot3: 0.0,
            pixel1: 172e-6,
            pixel2: 172e-6,
            wavelength: 0.406626e-10,
            polarization_factor: 0.99,
        }
    }

    fn picked_points(params: &GeometryParameters, calibrant: &Calibrant, rings: usize) -> PickedRingPoints {
        let geometry = Geometry::new(*params);
        let mut picked = PickedRingPoints::new();
        for ring in 0..rings {
            let tth = calibrant.ring_two_theta(ring, params.wavelength_angstrom()).unwrap();
            picked.add_points(ring, &geometry.ring_points(tth, 24, (2048, 2048), 1));
        }
        picked
    }

    fn start() -> GeometryParameters {
        GeometryParameters {
            distance: 0.200,
            poni1: 1024.0 * 172e-6,
            poni2: 1024.0 * 172e-6,
            rot1: 0.0,
            rot2: 0.0,
            ..true_parameters()
        }
    }

    #[test]
    fn test_refinement_recovers_geometry() {
        let calibrant = Calibrant::by_name("LaB6").unwrap();
        let truth = true_parameters();
        let picked = picked_points(&truth, &calibrant, 6);
        let result = refine(&start(), &picked, &calibrant, &RefinementOptions::default(), None).unwrap();
        assert_relative_eq!(result.parameters.distance, truth.distance, epsilon = 1e-7);
        assert_relative_eq!(result.parameters.poni1, truth.poni1, epsilon = 1e-7);
        assert_relative_eq!(result.parameters.rot2, truth.rot2, epsilon = 1e-6);
        assert!(result.rms_residual < 1e-9);
    }

    #[test]
    fn test_too_few_points() {
        let calibrant = Calibrant::by_name("LaB6").unwrap();
        let mut picked = PickedRingPoints::new();
        picked.add_points(0, &[(1.0, 2.0), (3.0, 4.0)]);
        let err = refine(&start(), &picked, &calibrant, &RefinementOptions::default(), None).unwrap_err();
        assert!(matches!(err, GeometryError::TooFewPoints { found: 2, .. }));
    }

    #[test]
    fn test_ring_outside_calibrant_is_rejected() {
        let calibrant = Calibrant::new("two rings", vec![4.0, 2.0]);
        let mut picked = PickedRingPoints::new();
        picked.add_points(0, &[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]);
        picked.add_points(5, &[(7.0, 8.0), (9.0, 10.0), (11.0, 12.0)]);
        let err = refine(&start(), &picked, &calibrant, &RefinementOptions::default(), None).unwrap_err();
        assert!(matches!(err, GeometryError::UnknownRing { ring: 5, rings: 2 }));
    }

    #[test]
    fn test_rot3_is_rank_deficient() {
        let calibrant = Calibrant::by_name("LaB6").unwrap();
        let picked = picked_points(&true_parameters(), &calibrant, 3);
        let options = RefinementOptions {
            refine_rot3: true,
            ..Default::default()
        };
        let err = refine(&start(), &picked, &calibrant, &options, None).unwrap_err();
        assert!(matches!(err, GeometryError::RankDeficient(_)));
    }

    #[test]
    fn test_cancel_keeps_parameters() {
        let calibrant = Calibrant::by_name("LaB6").unwrap();
        let picked = picked_points(&true_parameters(), &calibrant, 3);
        let mut geometry = Geometry::new(start());
        let cancel = AtomicBool::new(true);
        let err = geometry
            .refine(&picked, &calibrant, &RefinementOptions::default(), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, GeometryError::Cancelled));
        assert_eq!(*geometry.parameters(), start());
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        let mut picked = PickedRingPoints::new();
        picked.add_points(0, &[(10.5, 20.25), (11.0, 21.0)]);
        picked.add_point(2, 100.0, 5.0);
        picked.to_csv(&path).unwrap();
        assert_eq!(PickedRingPoints::from_csv(&path).unwrap(), picked);
    }
}
