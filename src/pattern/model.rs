/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Primary pattern and overlays

use std::path::Path;

use super::background::AutoBackground;
use super::errors::{PatternError, Result};
use super::io::{load_pattern, save_pattern};
use super::pattern::Pattern;
use crate::configuration::signals::Signal;

/// Colors handed out to new overlays in turn
const OVERLAY_PALETTE: [[u8; 3]; 8] = [
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
    [23, 190, 207],
];

/// A pattern drawn next to the primary one
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub pattern: Pattern,
    pub visible: bool,
    pub color: [u8; 3],
}

/// Overlay list notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternEvent {
    OverlayAdded(usize),
    OverlayRemoved(usize),
    OverlayChanged(usize),
    BackgroundChanged(Option<usize>),
}

/// Owner of the primary pattern and the overlay list
#[derive(Debug, Default)]
pub struct PatternModel {
    pattern: Pattern,
    overlays: Vec<Overlay>,
    background_overlay: Option<usize>,
    next_color: usize,
    pub pattern_changed: Signal<()>,
    pub overlay_events: Signal<PatternEvent>,
}

impl PatternModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the state without subscribers
    pub fn duplicate(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            overlays: self.overlays.clone(),
            background_overlay: self.background_overlay,
            next_color: self.next_color,
            ..Default::default()
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn overlay(&self, index: usize) -> Result<&Overlay> {
        self.overlays.get(index).ok_or(PatternError::NoSuchOverlay(index))
    }

    pub fn background_overlay(&self) -> Option<usize> {
        self.background_overlay
    }

    /// Replace the primary data
    ///
    /// An overlay background that no longer overlaps is unset with a warning.
    pub fn set_pattern(&mut self, x: Vec<f64>, y: Vec<f64>, name: &str) -> Result<()> {
        if x.len() != y.len() {
            return Err(PatternError::LengthMismatch { x: x.len(), y: y.len() });
        }
        self.pattern.name = name.to_string();
        match self.pattern.set_data(x, y) {
            Err(PatternError::BkgNotInRange) => {
                log::warn!("background overlay does not overlap the new pattern, unset");
                self.background_overlay = None;
                self.overlay_events.emit(PatternEvent::BackgroundChanged(None));
            }
            Err(e) => log::warn!("automatic background failed: {}", e),
            Ok(()) => {}
        }
        self.pattern_changed.emit(());
        Ok(())
    }

    /// Load the primary pattern from a file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let loaded = load_pattern(path)?;
        self.set_pattern(loaded.x().to_vec(), loaded.y().to_vec(), &loaded.name)
    }

    /// Save the effective primary pattern
    pub fn save<P: AsRef<Path>>(&self, path: P, header: &str, x_label: &str) -> Result<()> {
        save_pattern(path, &self.pattern, header, x_label)
    }

    pub fn add_overlay(&mut self, pattern: Pattern) -> usize {
        let color = OVERLAY_PALETTE[self.next_color % OVERLAY_PALETTE.len()];
        self.next_color += 1;
        self.overlays.push(Overlay {
            pattern,
            visible: true,
            color,
        });
        let index = self.overlays.len() - 1;
        self.overlay_events.emit(PatternEvent::OverlayAdded(index));
        index
    }

    pub fn add_overlay_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        Ok(self.add_overlay(load_pattern(path)?))
    }

    /// Add the raw primary data as a new overlay
    pub fn add_spectrum_as_overlay(&mut self) -> usize {
        let copy = Pattern::new(
            self.pattern.x().to_vec(),
            self.pattern.y().to_vec(),
            &self.pattern.name,
        )
        .unwrap_or_default();
        self.add_overlay(copy)
    }

    pub fn remove_overlay(&mut self, index: usize) -> Result<Overlay> {
        if index >= self.overlays.len() {
            return Err(PatternError::NoSuchOverlay(index));
        }
        match self.background_overlay {
            Some(b) if b == index => self.unset_background(),
            Some(b) if b > index => self.background_overlay = Some(b - 1),
            _ => {}
        }
        let removed = self.overlays.remove(index);
        self.overlay_events.emit(PatternEvent::OverlayRemoved(index));
        Ok(removed)
    }

    fn overlay_mut(&mut self, index: usize) -> Result<&mut Overlay> {
        self.overlays
            .get_mut(index)
            .ok_or(PatternError::NoSuchOverlay(index))
    }

    /// Notify about an overlay edit and refresh the background snapshot when needed
    fn overlay_edited(&mut self, index: usize) {
        self.overlay_events.emit(PatternEvent::OverlayChanged(index));
        if self.background_overlay == Some(index) {
            let bkg = self.overlays[index].pattern.clone();
            if let Err(e) = self.pattern.set_background_pattern(Some(bkg)) {
                log::warn!("background overlay {} could not be applied: {}", index, e);
            }
            self.pattern_changed.emit(());
        }
    }

    pub fn set_overlay_scaling(&mut self, index: usize, scaling: f64) -> Result<()> {
        self.overlay_mut(index)?.pattern.set_scaling(scaling);
        self.overlay_edited(index);
        Ok(())
    }

    pub fn set_overlay_offset(&mut self, index: usize, offset: f64) -> Result<()> {
        self.overlay_mut(index)?.pattern.set_offset(offset);
        self.overlay_edited(index);
        Ok(())
    }

    pub fn set_overlay_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.overlay_mut(index)?.visible = visible;
        self.overlay_edited(index);
        Ok(())
    }

    pub fn set_overlay_color(&mut self, index: usize, color: [u8; 3]) -> Result<()> {
        self.overlay_mut(index)?.color = color;
        self.overlay_events.emit(PatternEvent::OverlayChanged(index));
        Ok(())
    }

    /// Use overlay `index` as the primary pattern's background
    ///
    /// Rejected with `BkgNotInRange` when the ranges do not overlap; the
    /// previous background is kept in that case.
    pub fn set_overlay_as_background(&mut self, index: usize) -> Result<()> {
        let bkg = self.overlay(index)?.pattern.clone();
        self.pattern.set_background_pattern(Some(bkg))?;
        self.background_overlay = Some(index);
        self.overlay_events
            .emit(PatternEvent::BackgroundChanged(Some(index)));
        self.pattern_changed.emit(());
        Ok(())
    }

    pub fn unset_background(&mut self) {
        if self.background_overlay.take().is_none() && self.pattern.background_pattern().is_none() {
            return;
        }
        if let Err(e) = self.pattern.set_background_pattern(None) {
            log::warn!("background could not be removed: {}", e);
        }
        self.overlay_events.emit(PatternEvent::BackgroundChanged(None));
        self.pattern_changed.emit(());
    }

    /// Enable or disable the automatic background
    pub fn set_auto_background(&mut self, params: Option<AutoBackground>) -> Result<()> {
        self.pattern.set_auto_background(params)?;
        self.pattern_changed.emit(());
        Ok(())
    }
}
