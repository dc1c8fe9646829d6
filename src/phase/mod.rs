/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Reference phases
//!
//! jcpds and CIF phase files, the Birch-Murnaghan equation of state used to
//! move reflections with pressure and temperature, and the phase list.

pub mod cif;
pub mod database;
pub mod eos;
pub mod errors;
pub mod jcpds;
pub mod model;
pub mod scattering;
pub mod symmetry;

pub use cif::{CifAtom, CifPhase, CifReflection};
pub use eos::{birch_murnaghan_pressure, birch_murnaghan_volume, EquationOfState};
pub use errors::{PhaseError, Result};
pub use jcpds::{CrystalSystem, Jcpds, JcpdsFormat, Reflection, UnitCell};
pub use model::{PhaseEntry, PhaseEvent, PhaseModel};
pub use symmetry::SymmetryOperation;
