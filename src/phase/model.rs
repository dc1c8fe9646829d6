/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! The list of reference phases

use std::path::{Path, PathBuf};

use super::cif::CifPhase;
use super::errors::{PhaseError, Result};
use super::jcpds::Jcpds;
use crate::configuration::signals::Signal;
use crate::geometry::Unit;

/// Line colors handed out in turn
const PHASE_PALETTE: [[u8; 3]; 6] = [
    [228, 26, 28],
    [55, 126, 184],
    [77, 175, 74],
    [152, 78, 163],
    [255, 127, 0],
    [166, 86, 40],
];

/// Phase list notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Added(usize),
    Removed(usize),
    Changed(usize),
}

/// A phase with its display state
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseEntry {
    pub jcpds: Jcpds,
    pub visible: bool,
    pub color: [u8; 3],
    /// File the phase was loaded from
    pub source: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct PhaseModel {
    phases: Vec<PhaseEntry>,
    next_color: usize,
    pub events: Signal<PhaseEvent>,
}

impl PhaseModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the phases without subscribers
    pub fn duplicate(&self) -> Self {
        Self {
            phases: self.phases.clone(),
            next_color: self.next_color,
            ..Default::default()
        }
    }

    pub fn phases(&self) -> &[PhaseEntry] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phase(&self, index: usize) -> Result<&PhaseEntry> {
        self.phases.get(index).ok_or(PhaseError::NoSuchPhase(index))
    }

    fn phase_mut(&mut self, index: usize) -> Result<&mut PhaseEntry> {
        self.phases.get_mut(index).ok_or(PhaseError::NoSuchPhase(index))
    }

    pub fn add_phase(&mut self, jcpds: Jcpds, source: Option<PathBuf>) -> usize {
        let color = PHASE_PALETTE[self.next_color % PHASE_PALETTE.len()];
        self.next_color += 1;
        self.phases.push(PhaseEntry {
            jcpds,
            visible: true,
            color,
            source,
        });
        let index = self.phases.len() - 1;
        self.events.emit(PhaseEvent::Added(index));
        index
    }

    /// Load a jcpds file
    pub fn add_jcpds<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let jcpds = Jcpds::read(path)?;
        log::info!("loaded phase {} with {} reflections", jcpds.name, jcpds.reflections().len());
        Ok(self.add_phase(jcpds, Some(path.to_path_buf())))
    }

    /// Load a CIF file and compute its lines
    ///
    /// # Arguments
    ///
    /// * `path` - CIF file
    /// * `wavelength` - X-ray wavelength in Å
    /// * `d_min` - Smallest d-spacing in Å
    /// * `min_intensity` - Lines weaker than this (of 100) are dropped
    pub fn add_cif<P: AsRef<Path>>(
        &mut self,
        path: P,
        wavelength: f64,
        d_min: f64,
        min_intensity: f64,
    ) -> Result<usize> {
        let path = path.as_ref();
        let cif = CifPhase::read(path)?;
        let jcpds = cif.to_jcpds(wavelength, d_min, min_intensity)?;
        Ok(self.add_phase(jcpds, Some(path.to_path_buf())))
    }

    pub fn remove(&mut self, index: usize) -> Result<PhaseEntry> {
        if index >= self.phases.len() {
            return Err(PhaseError::NoSuchPhase(index));
        }
        let removed = self.phases.remove(index);
        self.events.emit(PhaseEvent::Removed(index));
        Ok(removed)
    }

    pub fn clear(&mut self) {
        while !self.phases.is_empty() {
            let last = self.phases.len() - 1;
            self.phases.pop();
            self.events.emit(PhaseEvent::Removed(last));
        }
    }

    /// Move one phase to (P, T); rolled back on failure
    pub fn set_pressure_temperature(&mut self, index: usize, pressure: f64, temperature: f64) -> Result<()> {
        self.phase_mut(index)?
            .jcpds
            .set_pressure_temperature(pressure, temperature)?;
        self.events.emit(PhaseEvent::Changed(index));
        Ok(())
    }

    pub fn set_pressure(&mut self, index: usize, pressure: f64) -> Result<()> {
        let temperature = self.phase(index)?.jcpds.temperature();
        self.set_pressure_temperature(index, pressure, temperature)
    }

    pub fn set_temperature(&mut self, index: usize, temperature: f64) -> Result<()> {
        let pressure = self.phase(index)?.jcpds.pressure();
        self.set_pressure_temperature(index, pressure, temperature)
    }

    /// Apply `update` to every phase; phases that fail keep their state
    ///
    /// Returns the first failure after all phases were tried.
    fn update_all<F>(&mut self, update: F) -> Result<()>
    where
        F: Fn(&mut Jcpds) -> Result<()>,
    {
        let mut first_error = None;
        for index in 0..self.phases.len() {
            match update(&mut self.phases[index].jcpds) {
                Ok(()) => self.events.emit(PhaseEvent::Changed(index)),
                Err(e) => {
                    log::warn!("phase {}: {}", self.phases[index].jcpds.name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn set_pressure_all(&mut self, pressure: f64) -> Result<()> {
        self.update_all(|j| j.set_pressure(pressure))
    }

    pub fn set_temperature_all(&mut self, temperature: f64) -> Result<()> {
        self.update_all(|j| j.set_temperature(temperature))
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.phase_mut(index)?.visible = visible;
        self.events.emit(PhaseEvent::Changed(index));
        Ok(())
    }

    pub fn set_color(&mut self, index: usize, color: [u8; 3]) -> Result<()> {
        self.phase_mut(index)?.color = color;
        self.events.emit(PhaseEvent::Changed(index));
        Ok(())
    }

    /// Write a phase as jcpds
    pub fn save<P: AsRef<Path>>(&self, index: usize, path: P) -> Result<()> {
        self.phase(index)?.jcpds.write(path)
    }

    /// Line positions in `unit` with their intensities
    ///
    /// Lines unreachable at `wavelength` are left out.
    pub fn line_positions(&self, index: usize, wavelength: f64, unit: Unit) -> Result<Vec<(f64, f64)>> {
        let jcpds = &self.phase(index)?.jcpds;
        Ok(jcpds
            .reflections()
            .iter()
            .filter_map(|r| {
                let sin_theta = wavelength / (2.0 * r.d);
                if !(0.0..1.0).contains(&sin_theta) {
                    return None;
                }
                let tth = 2.0 * sin_theta.asin();
                Some((unit.from_tth_rad(tth, wavelength), r.intensity))
            })
            .collect())
    }
}
