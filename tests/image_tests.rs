/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

use dioptas_rs::geometry::{Geometry, GeometryParameters};
use dioptas_rs::image::corrections::detector_absorption;
use dioptas_rs::image::loader::write_tiff;
use dioptas_rs::image::{ImageModel, IterationMode, Transform};
use dioptas_rs::mask::{CosmicOptions, MaskModel};
use ndarray::{Array2, Array3};
use ndarray_npy::WriteNpyExt;
use std::fs::File;
use rstest::rstest;
use std::path::Path;
use tempfile::tempdir;

fn write_series(dir: &Path, count: usize) {
    for k in 1..=count {
        let frame = Array2::from_elem((8, 6), k as f32);
        write_tiff(dir.join(format!("img_{:03}.tif", k)), &frame).unwrap();
    }
}

#[test]
fn test_file_iteration_by_number() {
    let dir = tempdir().unwrap();
    write_series(dir.path(), 10);
    let mut image = ImageModel::new();
    image.set_iteration_mode(IterationMode::Number);

    image.load(dir.path().join("img_005.tif")).unwrap();
    let next = image.load_next(1).unwrap();
    assert_eq!(next, Some(dir.path().join("img_006.tif")));
    assert_eq!(image.effective_image().unwrap()[[0, 0]], 6.0);

    image.load(dir.path().join("img_010.tif")).unwrap();
    assert_eq!(image.load_next(1).unwrap(), None);
    assert_eq!(image.path(), Some(dir.path().join("img_010.tif").as_path()));

    image.load(dir.path().join("img_001.tif")).unwrap();
    assert_eq!(image.load_previous(1).unwrap(), None);
}

#[test]
fn test_iteration_without_image_fails() {
    let mut image = ImageModel::new();
    assert!(image.load_next(1).is_err());
}

#[test]
fn test_transforms_survive_next_file() {
    let dir = tempdir().unwrap();
    write_series(dir.path(), 2);
    let mut image = ImageModel::new();
    image.load(dir.path().join("img_001.tif")).unwrap();
    image.add_transform(Transform::RotateCw);
    image.load_next(1).unwrap();
    assert_eq!(image.transforms(), &[Transform::RotateCw]);
    assert_eq!(image.shape(), Some((6, 8)));
}

#[rstest]
#[case(vec![Transform::RotateCw])]
#[case(vec![Transform::RotateCcw, Transform::FlipHorizontal])]
#[case(vec![Transform::FlipVertical, Transform::RotateCw, Transform::RotateCw])]
#[case(vec![Transform::FlipHorizontal, Transform::FlipVertical, Transform::RotateCcw, Transform::RotateCw])]
fn test_reset_restores_original_pixels(#[case] transforms: Vec<Transform>) {
    let raw = Array2::from_shape_fn((7, 11), |(i, j)| (i * 11 + j) as f32 * 0.5);
    let mut image = ImageModel::new();
    image.set_image_data(raw.clone());
    for t in transforms {
        image.add_transform(t);
    }
    image.reset_transforms();
    let effective = image.effective_image().unwrap();
    let original: Vec<u32> = raw.iter().map(|v| v.to_bits()).collect();
    let restored: Vec<u32> = effective.iter().map(|v| v.to_bits()).collect();
    assert_eq!(restored, original);
}

#[rstest]
#[case(&[(5, 5)])]
#[case(&[(3, 3), (3, 4), (4, 3), (10, 12)])]
#[case(&[(1, 1), (18, 18), (9, 2)])]
fn test_shrink_undoes_grow(#[case] pixels: &[(usize, usize)]) {
    let mut mask = MaskModel::new((20, 20));
    for &(r, c) in pixels {
        mask.set_pixel(r, c);
    }
    let before = mask.mask().clone();
    mask.grow();
    mask.shrink();
    assert_eq!(mask.mask(), &before);
}

#[test]
fn test_mask_file_round_trip_with_supersampling() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("detector.mask");
    let mut mask = MaskModel::new((30, 40));
    mask.mask_rectangle((2.0, 3.0), (8.0, 9.0));
    mask.mask_circle((20.0, 30.0), 4.0);
    mask.save(&path).unwrap();

    let mut restored = MaskModel::new((30, 40));
    restored.load(&path).unwrap();
    assert_eq!(restored.mask(), mask.mask());

    restored.set_supersampling(2);
    assert_eq!(restored.count(), mask.count() * 4);
    restored.set_supersampling(1);
    assert_eq!(restored.mask(), mask.mask());
}

#[test]
fn test_series_frames_from_npy_stack() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack.npy");
    let stack = Array3::from_shape_fn((4, 6, 5), |(k, i, j)| (k * 100 + i * 10 + j) as f32);
    stack.write_npy(File::create(&path).unwrap()).unwrap();

    let mut image = ImageModel::new();
    image.load(&path).unwrap();
    assert_eq!(image.frame().unwrap().series_len(), 4);
    image.load_series_frame(3).unwrap();
    assert_eq!(image.frame().unwrap().series_index(), 3);
    assert_eq!(image.effective_image().unwrap()[[1, 2]], 312.0);
    assert!(image.load_series_frame(4).is_err());
}

#[test]
fn test_background_and_absorption_are_undone() {
    let raw = Array2::from_elem((32, 32), 50.0f32);
    let mut image = ImageModel::new();
    image.set_image_data(raw.clone());

    image.set_background_data(Array2::from_elem((32, 32), 10.0));
    image.set_background_scaling(2.0);
    assert_eq!(image.effective_image().unwrap()[[5, 5]], 30.0);
    image.clear_background();
    assert_eq!(*image.effective_image().unwrap(), raw);

    let geometry = Geometry::new(GeometryParameters {
        distance: 0.05,
        pixel1: 172e-6,
        pixel2: 172e-6,
        ..Default::default()
    });
    let tth = geometry.tth_array((32, 32), 1);
    image
        .set_absorption_correction("detector", Some(detector_absorption(&tth, 0.8)))
        .unwrap();
    assert_ne!(*image.effective_image().unwrap(), raw);
    image.set_absorption_correction("detector", None).unwrap();
    assert_eq!(*image.effective_image().unwrap(), raw);
}

#[test]
fn test_mask_paint_operations() {
    let mut mask = MaskModel::new((40, 40));
    mask.mask_ellipse((20.0, 20.0), (8.0, 3.0), 0.0);
    let ellipse = mask.count();
    assert!(ellipse > 60 && ellipse < 90);
    mask.remove_ellipse((20.0, 20.0), (8.0, 3.0), 0.0);
    assert_eq!(mask.count(), 0);

    mask.mask_polygon(&[(0.0, 0.0), (0.0, 10.0), (10.0, 0.0)]);
    assert!(mask.mask()[[1, 1]]);
    assert!(!mask.mask()[[9, 9]]);
    mask.remove_polygon(&[(0.0, 0.0), (0.0, 10.0), (10.0, 0.0)]);
    assert_eq!(mask.count(), 0);

    mask.mask_rectangle((30.0, 30.0), (35.0, 35.0));
    mask.remove_rectangle((30.0, 30.0), (32.0, 35.0));
    assert_eq!(mask.count(), 18);
    mask.mask_circle((10.0, 30.0), 3.0);
    mask.remove_circle((10.0, 30.0), 3.0);
    mask.clear_pixel(35, 35);
    assert_eq!(mask.count(), 17);

    assert!(mask.undo());
    assert_eq!(mask.count(), 18);
}

#[test]
fn test_cosmic_rays_are_masked() {
    let image = Array2::from_shape_fn((30, 30), |(i, j)| 10.0 + 0.1 * ((i + j) % 3) as f32);
    let mut image = image;
    image[[7, 8]] = 1000.0;
    image[[20, 22]] = 800.0;
    let mut mask = MaskModel::new((30, 30));
    let found = mask.mask_cosmic(image.view(), &CosmicOptions::default()).unwrap();
    assert_eq!(found, 2);
    assert!(mask.mask()[[7, 8]] && mask.mask()[[20, 22]]);
}
