/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Physical and engine-wide constants

/// Number of Angstroms in one meter
pub const ANGSTROM_PER_METER: f64 = 1e10;

/// Reference temperature of the jcpds cell parameters in K
pub const REFERENCE_TEMPERATURE: f64 = 298.0;

/// Default number of radial and azimuthal bins of the cake
pub const DEFAULT_CAKE_POINTS: usize = 2048;

/// Maximum number of states kept by undo/redo histories
pub const HISTORY_DEPTH: usize = 50;
