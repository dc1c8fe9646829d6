/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Command line interface
//!
//! Batch access to the reduction engine without the GUI:
//! - `integrate`: azimuthal integration of images or whole directories
//! - `calibrate`: refine a geometry from picked ring points
//! - `background`: extract the automatic background of a pattern
//! - `phase`: list the reflections of a jcpds or CIF phase at (P, T)

pub mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::geometry::Unit;

#[derive(Parser, Debug)]
#[command(name = "dioptas-rs")]
#[command(version)]
#[command(about = "Reduction of 2D X-ray diffraction images", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Integrate images into 1D patterns
    Integrate(IntegrateArgs),

    /// Refine the detector geometry against a calibrant
    Calibrate(CalibrateArgs),

    /// Subtract the automatic background from a pattern file
    Background(BackgroundArgs),

    /// Show the reflections of a phase at pressure and temperature
    Phase(PhaseArgs),
}

/// Radial unit of the output
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum UnitArg {
    /// 2θ in degrees
    #[default]
    Tth,
    /// q in 1/Å
    Q,
    /// d-spacing in Å
    D,
}

impl From<UnitArg> for Unit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Tth => Unit::TwoTheta,
            UnitArg::Q => Unit::Q,
            UnitArg::D => Unit::D,
        }
    }
}

#[derive(Args, Debug)]
pub struct IntegrateArgs {
    /// Image files or directories to integrate
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// PONI calibration file
    #[arg(short, long)]
    pub poni: PathBuf,

    /// Mask file at native resolution
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Output directory, defaults to the directory of each image
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = UnitArg::Tth)]
    pub unit: UnitArg,

    /// Number of bins (default: derived from the image size)
    #[arg(short, long)]
    pub bins: Option<usize>,

    /// Supersampling factor
    #[arg(short, long, default_value_t = 1)]
    pub supersampling: usize,

    /// Write .chi files instead of .xy
    #[arg(long, default_value_t = false)]
    pub chi: bool,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Skip the polarization correction
    #[arg(long, default_value_t = false)]
    pub no_polarization: bool,
}

#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Starting geometry as PONI file
    #[arg(short, long)]
    pub poni: PathBuf,

    /// Picked points as `ring,row,col` CSV
    #[arg(long)]
    pub points: PathBuf,

    /// Calibrant name (e.g. LaB6) or path to a .D file
    #[arg(short, long)]
    pub calibrant: String,

    /// Refined PONI file to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also refine the wavelength
    #[arg(long, default_value_t = false)]
    pub refine_wavelength: bool,

    /// Keep the detector tilt fixed
    #[arg(long, default_value_t = false)]
    pub fix_rotations: bool,
}

#[derive(Args, Debug)]
pub struct BackgroundArgs {
    /// Pattern file (.xy, .chi or .dat)
    pub input: PathBuf,

    /// Output pattern with the background removed
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write the background itself
    #[arg(long)]
    pub background_output: Option<PathBuf>,

    /// Smoothing half width in x units
    #[arg(short, long, default_value_t = 0.1)]
    pub width: f64,

    /// Number of smoothing iterations
    #[arg(short, long, default_value_t = 50)]
    pub iterations: usize,

    /// Polynomial order of the fit
    #[arg(short = 'n', long, default_value_t = 50)]
    pub order: usize,

    /// Lower end of the region of interest
    #[arg(long, requires = "xmax")]
    pub xmin: Option<f64>,

    /// Upper end of the region of interest
    #[arg(long, requires = "xmin")]
    pub xmax: Option<f64>,
}

#[derive(Args, Debug)]
pub struct PhaseArgs {
    /// jcpds or CIF file
    pub input: PathBuf,

    /// Pressure in GPa
    #[arg(short, long, default_value_t = 0.0)]
    pub pressure: f64,

    /// Temperature in K
    #[arg(short, long, default_value_t = 298.0)]
    pub temperature: f64,

    /// Wavelength in Å
    #[arg(short, long, default_value_t = 0.3344)]
    pub wavelength: f64,

    #[arg(short, long, value_enum, default_value_t = UnitArg::Tth)]
    pub unit: UnitArg,

    /// Smallest d-spacing computed for CIF input, in Å
    #[arg(long, default_value_t = 0.5)]
    pub d_min: f64,

    /// Weakest relative intensity kept for CIF input
    #[arg(long, default_value_t = 0.5)]
    pub min_intensity: f64,

    /// Write the compressed phase as jcpds
    #[arg(long)]
    pub save: Option<PathBuf>,
}
