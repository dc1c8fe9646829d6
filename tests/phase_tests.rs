/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

use approx::assert_relative_eq;
use dioptas_rs::geometry::Unit;
use dioptas_rs::phase::{birch_murnaghan_pressure, birch_murnaghan_volume, CrystalSystem, Jcpds, PhaseError, PhaseModel};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

const GOLD: &str = "VERSION: 4
COMMENT: Gold
K0: 166.65
K0P: 5.4823
DK0DT: 0
DK0PDT: 0
SYMMETRY: CUBIC
A: 4.07860
ALPHAT: 4.26e-5
DALPHADT: 0
DIHKL: 2.3548 100 1 1 1
DIHKL: 2.0393 52 2 0 0
DIHKL: 1.4420 32 2 2 0
DIHKL: 1.2298 36 3 1 1
";

const RIGID: &str = "VERSION: 4
COMMENT: no equation of state
K0: 0
K0P: 0
SYMMETRY: TETRAGONAL
A: 4.0
C: 6.0
DIHKL: 4.0 100 1 0 0
DIHKL: 3.0 50 0 0 2
";

const ALUMINIUM_CIF: &str = "data_Al
_cell_length_a 4.0495
_cell_length_b 4.0495
_cell_length_c 4.0495
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
_space_group_IT_number 225
loop_
_symmetry_equiv_pos_as_xyz
x,y,z
x+1/2,y+1/2,z
x+1/2,y,z+1/2
x,y+1/2,z+1/2
loop_
_atom_site_label
_atom_site_type_symbol
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
Al1 Al 0 0 0
";

#[test]
fn test_birch_murnaghan_ten_percent_compression() {
    let p = birch_murnaghan_pressure(1.0, 0.9, 160.0, 4.0);
    let expected = 1.5 * 160.0 * (0.9f64.powf(-7.0 / 3.0) - 0.9f64.powf(-5.0 / 3.0));
    assert_relative_eq!(p, expected, epsilon = 1e-10);
    assert_relative_eq!(p, 20.8162, epsilon = 1e-4);
}

#[rstest]
#[case(1.0, 160.0, 4.0, 20.0)]
#[case(67.85, 166.65, 5.4823, 100.0)]
#[case(40.0, 37.1, 6.0, 3.0)]
fn test_volume_solves_equation_of_state(#[case] v0: f64, #[case] k0: f64, #[case] k0p: f64, #[case] p: f64) {
    let v = birch_murnaghan_volume(p, v0, k0, k0p).unwrap();
    assert!(v < v0);
    assert_relative_eq!(birch_murnaghan_pressure(v0, v, k0, k0p), p, max_relative = 1e-6);
}

#[test]
fn test_jcpds_reference_state_and_compression() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("au.jcpds");
    fs::write(&path, GOLD).unwrap();

    let mut phases = PhaseModel::new();
    let index = phases.add_jcpds(&path).unwrap();
    let gold = &phases.phase(index).unwrap().jcpds;
    assert_eq!(gold.symmetry(), CrystalSystem::Cubic);
    for r in gold.reflections() {
        assert_relative_eq!(r.d, r.d0, max_relative = 1e-8);
    }
    let ambient = phases.line_positions(index, 0.3344, Unit::TwoTheta).unwrap();

    phases.set_pressure_all(50.0).unwrap();
    let compressed = phases.line_positions(index, 0.3344, Unit::TwoTheta).unwrap();
    assert_eq!(ambient.len(), compressed.len());
    for ((a, ia), (c, ic)) in ambient.iter().zip(&compressed) {
        assert!(c > a);
        assert_eq!(ia, ic);
    }

    // Isotropic compression scales every d by the same factor
    let gold = &phases.phase(index).unwrap().jcpds;
    let ratio = gold.reflections()[0].d / gold.reflections()[0].d0;
    for r in gold.reflections() {
        assert_relative_eq!(r.d / r.d0, ratio, max_relative = 1e-9);
    }
    assert_relative_eq!(ratio.powi(3), gold.volume() / gold.v0(), max_relative = 1e-9);

    phases.set_pressure_temperature(index, 0.0, 298.0).unwrap();
    for r in phases.phase(index).unwrap().jcpds.reflections() {
        assert_relative_eq!(r.d, r.d0, max_relative = 1e-8);
    }
}

#[test]
fn test_phase_without_equation_of_state_is_rigid() {
    let mut phase = Jcpds::parse(RIGID, "rigid").unwrap();
    let before: Vec<f64> = phase.reflections().iter().map(|r| r.d).collect();
    phase.set_pressure(25.0).unwrap();
    let after: Vec<f64> = phase.reflections().iter().map(|r| r.d).collect();
    assert_eq!(before, after);
}

#[test]
fn test_failed_pressure_leaves_phase_untouched() {
    let mut phase = Jcpds::parse(GOLD, "au").unwrap();
    phase.set_pressure(20.0).unwrap();
    let d = phase.reflections()[0].d;
    assert!(matches!(phase.set_pressure(1e6), Err(PhaseError::EosSolve(_))));
    assert_eq!(phase.pressure(), 20.0);
    assert_eq!(phase.reflections()[0].d, d);
}

#[test]
fn test_saved_phase_reads_back() {
    let dir = tempdir().unwrap();
    let mut phase = Jcpds::parse(GOLD, "au").unwrap();
    phase.add_reflection(2, 2, 2, 1.1774, 12.0);
    let path = dir.path().join("au_edit.jcpds");
    phase.write(&path).unwrap();

    let read = Jcpds::read(&path).unwrap();
    assert_eq!(read.reflections().len(), 5);
    assert_relative_eq!(read.eos().k0, 166.65);
    assert_relative_eq!(read.cell0().a, 4.0786);
}

#[test]
fn test_cif_phase_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("al.cif");
    fs::write(&path, ALUMINIUM_CIF).unwrap();

    let mut phases = PhaseModel::new();
    let index = phases.add_cif(&path, 0.3344, 0.8, 1.0).unwrap();
    let al = &phases.phase(index).unwrap().jcpds;
    assert_eq!(al.symmetry(), CrystalSystem::Cubic);
    let first = &al.reflections()[0];
    assert_eq!((first.h, first.k, first.l), (1, 1, 1));
    assert_relative_eq!(first.intensity, 100.0);
    assert_relative_eq!(first.d0, 4.0495 / 3f64.sqrt(), max_relative = 1e-9);

    let d_lines = phases.line_positions(index, 0.3344, Unit::D).unwrap();
    for ((d, _), r) in d_lines.iter().zip(al.reflections()) {
        assert_relative_eq!(*d, r.d, max_relative = 1e-9);
    }
}

#[test]
fn test_remove_phase() {
    let mut phases = PhaseModel::new();
    phases.add_phase(Jcpds::parse(GOLD, "au").unwrap(), None);
    phases.add_phase(Jcpds::parse(RIGID, "rigid").unwrap(), None);
    let removed = phases.remove(0).unwrap();
    assert_eq!(removed.jcpds.name, "au");
    assert_eq!(phases.len(), 1);
    assert!(matches!(phases.remove(3), Err(PhaseError::NoSuchPhase(3))));
}

#[test]
fn test_heating_expands_every_phase() {
    let mut phases = PhaseModel::new();
    let au = phases.add_phase(Jcpds::parse(GOLD, "au").unwrap(), None);
    let rigid = phases.add_phase(Jcpds::parse(RIGID, "rigid").unwrap(), None);
    phases.set_visible(rigid, false).unwrap();
    phases.set_color(au, [255, 215, 0]).unwrap();

    phases.set_temperature_all(1500.0).unwrap();
    let gold = &phases.phase(au).unwrap().jcpds;
    assert!(gold.reflections()[0].d > gold.reflections()[0].d0);
    assert_eq!(phases.phase(au).unwrap().color, [255, 215, 0]);
    assert!(!phases.phase(rigid).unwrap().visible);
}

#[test]
fn test_remove_reflection() {
    let mut phase = Jcpds::parse(GOLD, "au").unwrap();
    let removed = phase.remove_reflection(1).unwrap();
    assert_eq!((removed.h, removed.k, removed.l), (2, 0, 0));
    assert_eq!(phase.reflections().len(), 3);
    assert!(phase.remove_reflection(10).is_err());
}
