/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

use approx::assert_relative_eq;
use dioptas_rs::pattern::io::{load_pattern, save_pattern};
use dioptas_rs::pattern::{extract_background, AutoBackground, Pattern, PatternError, PatternModel};
use rstest::rstest;
use tempfile::tempdir;

fn gauss(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    amplitude * (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| start + (stop - start) * i as f64 / (n - 1) as f64)
        .collect()
}

#[test]
fn test_overlay_scaled_as_background_negates_pattern() {
    let x = linspace(1.0, 20.0, 400);
    let y: Vec<f64> = x.iter().map(|&v| 5.0 + gauss(v, 30.0, 8.0, 0.2)).collect();
    let mut model = PatternModel::new();
    model.set_pattern(x, y.clone(), "primary").unwrap();

    let overlay = model.add_spectrum_as_overlay();
    model.set_overlay_scaling(overlay, 2.0).unwrap();
    model.set_overlay_offset(overlay, 0.0).unwrap();
    model.set_overlay_as_background(overlay).unwrap();

    let (_, effective) = model.pattern().data();
    assert_eq!(effective.len(), y.len());
    for (e, raw) in effective.iter().zip(&y) {
        assert_relative_eq!(*e, -raw, epsilon = 1e-9);
    }
}

#[test]
fn test_background_set_then_unset() {
    let x = linspace(0.0, 10.0, 200);
    let y: Vec<f64> = x.iter().map(|&v| 1.0 + v.sin().abs()).collect();
    let mut pattern = Pattern::new(x.clone(), y.clone(), "p").unwrap();

    let same = Pattern::new(x, y.clone(), "bkg").unwrap();
    pattern.set_background_pattern(Some(same)).unwrap();
    let (_, zeros) = pattern.data();
    assert!(zeros.iter().all(|v| v.abs() < 1e-12));

    pattern.set_background_pattern(None).unwrap();
    assert_eq!(pattern.data().1, y);
}

#[test]
fn test_disjoint_background_is_rejected() {
    let mut pattern = Pattern::new(linspace(0.0, 5.0, 50), vec![1.0; 50], "p").unwrap();
    let far = Pattern::new(linspace(10.0, 15.0, 50), vec![1.0; 50], "far").unwrap();
    let err = pattern.set_background_pattern(Some(far));
    assert!(matches!(err, Err(PatternError::BkgNotInRange)));
    assert!(pattern.background_pattern().is_none());
}

#[test]
fn test_auto_background_recovers_peaks() {
    let x = linspace(0.0, 24.0, 2500);
    let peaks: Vec<f64> = x
        .iter()
        .map(|&v| gauss(v, 10.0, 3.0, 0.1) + gauss(v, 12.0, 4.0, 0.1) + gauss(v, 12.0, 6.0, 0.1))
        .collect();
    let y: Vec<f64> = x.iter().zip(&peaks).map(|(&v, p)| p + 0.4 * v + 5.0).collect();
    let params = AutoBackground {
        smooth_width: 2.0,
        iterations: 50,
        poly_order: 50,
        roi: None,
    };

    let bkg = extract_background(&x, &y, &params).unwrap();
    let residual: Vec<f64> = y
        .iter()
        .zip(&bkg)
        .zip(&peaks)
        .map(|((y, b), p)| y - b - p)
        .collect();
    let rms = (residual.iter().map(|r| r * r).sum::<f64>() / residual.len() as f64).sqrt();
    assert!(rms < 0.15, "rms residual {}", rms);
    assert!(residual.iter().all(|r| r.abs() < 0.5));

    for (center, height) in [(3.0, 10.0), (4.0, 12.0), (6.0, 12.0)] {
        let k = x.iter().position(|&v| v >= center).unwrap();
        assert_relative_eq!(y[k] - bkg[k], peaks[k], epsilon = 0.05);
        assert!(peaks[k] > height * 0.9);
    }
}

#[rstest]
#[case(0.0)]
#[case(1.0)]
#[case(-3.5)]
#[case(1234.5)]
fn test_constant_signal_is_its_own_background(#[case] c: f64) {
    let x = linspace(0.0, 30.0, 600);
    let y = vec![c; x.len()];
    let bkg = extract_background(&x, &y, &AutoBackground::default()).unwrap();
    for b in bkg {
        assert_relative_eq!(b, c, epsilon = 1e-10, max_relative = 1e-10);
    }
}

#[test]
fn test_auto_background_on_model() {
    let x = linspace(0.0, 24.0, 1200);
    let y: Vec<f64> = x.iter().map(|&v| 0.4 * v + 5.0 + gauss(v, 10.0, 12.0, 0.1)).collect();
    let mut model = PatternModel::new();
    model.set_pattern(x.clone(), y, "auto").unwrap();
    model
        .set_auto_background(Some(AutoBackground {
            smooth_width: 1.0,
            ..AutoBackground::default()
        }))
        .unwrap();
    let (_, effective) = model.pattern().data();
    let k = x.iter().position(|&v| v >= 12.0).unwrap();
    assert!(effective[k] > 9.0);
    assert!(effective[0].abs() < 1.0);

    model.set_auto_background(None).unwrap();
    assert!(model.pattern().auto_background_values().is_none());
}

#[test]
fn test_pattern_file_round_trip() {
    let dir = tempdir().unwrap();
    let x = linspace(2.0, 30.0, 57);
    let y: Vec<f64> = x.iter().map(|v| v * v).collect();
    let pattern = Pattern::new(x.clone(), y.clone(), "sample").unwrap();

    for name in ["sample.xy", "sample.chi"] {
        let path = dir.path().join(name);
        save_pattern(&path, &pattern, "test header", "2th_deg").unwrap();
        let loaded = load_pattern(&path).unwrap();
        assert_eq!(loaded.name, "sample");
        assert_eq!(loaded.len(), x.len());
        for (a, b) in loaded.y().iter().zip(&y) {
            assert_relative_eq!(*a, *b, max_relative = 1e-7);
        }
    }
}

#[test]
fn test_overlay_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reference.xy");
    let x = linspace(0.0, 10.0, 101);
    let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
    save_pattern(&path, &Pattern::new(x, y, "reference").unwrap(), "", "x").unwrap();

    let mut model = PatternModel::new();
    let index = model.add_overlay_file(&path).unwrap();
    assert_eq!(model.overlay(index).unwrap().pattern.name, "reference");
    assert!(model.add_overlay_file(dir.path().join("missing.xy")).is_err());
    assert_eq!(model.overlays().len(), 1);
}
