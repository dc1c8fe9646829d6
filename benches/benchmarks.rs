/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dioptas_rs::geometry::{Geometry, GeometryParameters};
use dioptas_rs::integration::{integrate_1d, integrate_2d, IntegrationOptions};
use dioptas_rs::pattern::{extract_background, AutoBackground};
use ndarray::Array2;

fn detector(n: usize) -> (Geometry, Array2<f32>) {
    let geometry = Geometry::new(GeometryParameters {
        distance: 0.2,
        poni1: n as f64 * 172e-6 / 2.0,
        poni2: n as f64 * 172e-6 / 2.0,
        pixel1: 172e-6,
        pixel2: 172e-6,
        ..Default::default()
    });
    let c = n as f32 / 2.0;
    let image = Array2::from_shape_fn((n, n), |(i, j)| {
        let r = ((i as f32 - c).powi(2) + (j as f32 - c).powi(2)).sqrt();
        1000.0 + 300.0 * (r / 9.0).sin()
    });
    (geometry, image)
}

fn integration_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Integration");
    let (geometry, image) = detector(1024);
    let options = IntegrationOptions::default();

    // Warm the geometry cache so only the binning is timed
    let _ = integrate_1d(image.view(), None, &geometry, &options);

    group.bench_function("integrate_1d 1024x1024", |b| {
        b.iter(|| black_box(integrate_1d(black_box(image.view()), None, &geometry, &options)))
    });

    let cake_options = IntegrationOptions {
        cake_radial_bins: 512,
        cake_azimuth_bins: 360,
        ..IntegrationOptions::default()
    };
    let _ = integrate_2d(image.view(), None, &geometry, &cake_options);
    group.bench_function("integrate_2d 1024x1024", |b| {
        b.iter(|| black_box(integrate_2d(black_box(image.view()), None, &geometry, &cake_options)))
    });

    group.finish();
}

fn background_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Background");
    let n = 2500;
    let x: Vec<f64> = (0..n).map(|i| 24.0 * i as f64 / (n - 1) as f64).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|&v| 0.4 * v + 5.0 + 10.0 * (-(v - 3.0).powi(2) / 0.02).exp())
        .collect();
    let params = AutoBackground {
        smooth_width: 2.0,
        iterations: 50,
        poly_order: 50,
        roi: None,
    };

    group.bench_function("extract_background 2500 points", |b| {
        b.iter(|| black_box(extract_background(black_box(&x), black_box(&y), &params)))
    });

    group.finish();
}

criterion_group!(benches, integration_benchmark, background_benchmark);
criterion_main!(benches);
