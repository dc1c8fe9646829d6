/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Execution of the CLI subcommands

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{BackgroundArgs, CalibrateArgs, Commands, IntegrateArgs, PhaseArgs};
use crate::configuration::Configuration;
use crate::geometry::poni::{read_poni, write_poni};
use crate::geometry::refinement::refine;
use crate::geometry::{Calibrant, PickedRingPoints, RefinementOptions, Unit};
use crate::image::loader::is_supported;
use crate::pattern::io::{load_pattern, save_pattern};
use crate::pattern::{extract_background, AutoBackground, Pattern};
use crate::phase::PhaseModel;

/// Dispatch a parsed command
pub fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Integrate(args) => integrate(&args).map(|n| log::info!("integrated {} images", n)),
        Commands::Calibrate(args) => calibrate(&args),
        Commands::Background(args) => background(&args),
        Commands::Phase(args) => phase(&args),
    }
}

/// Expand directories into the supported image files they contain, sorted by name
pub fn collect_images(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let depth = if recursive { usize::MAX } else { 1 };
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .max_depth(depth)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| is_supported(path))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("{} does not exist", input.display());
        }
    }
    Ok(files)
}

/// Where the pattern of `image` is written
fn pattern_path(image: &Path, output: Option<&Path>, chi: bool) -> PathBuf {
    let dir = output
        .map(Path::to_path_buf)
        .or_else(|| image.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("pattern");
    dir.join(format!("{}.{}", stem, if chi { "chi" } else { "xy" }))
}

/// Integrate every input image, returning how many were written
pub fn integrate(args: &IntegrateArgs) -> Result<usize> {
    let files = collect_images(&args.inputs, args.recursive)?;
    if files.is_empty() {
        bail!("no supported images found");
    }
    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let mut configuration = Configuration::new();
    configuration
        .load_calibration(&args.poni)
        .with_context(|| format!("cannot read calibration {}", args.poni.display()))?;
    let unit: Unit = args.unit.into();
    configuration.options.unit = unit;
    configuration.options.bins = args.bins;
    configuration.options.polarization_correction = !args.no_polarization;
    configuration.image.set_supersampling(args.supersampling.max(1));

    let header = format!("Calibration: {}", args.poni.display());
    let mut mask_pending = args.mask.as_deref();
    for path in &files {
        configuration
            .image
            .load(path)
            .with_context(|| format!("cannot load {}", path.display()))?;
        if let (Some(mask), Some(shape)) = (mask_pending, configuration.image.supersampled_shape()) {
            configuration.mask.ensure_shape(shape, configuration.image.supersampling());
            configuration
                .mask
                .load_native(mask)
                .with_context(|| format!("cannot load mask {}", mask.display()))?;
            mask_pending = None;
        }
        configuration
            .integrate()
            .with_context(|| format!("integration of {} failed", path.display()))?;
        let out = pattern_path(path, args.output.as_deref(), args.chi);
        configuration
            .pattern
            .save(&out, &format!("{}\nImage: {}", header, path.display()), unit.label())?;
        log::info!("{} -> {}", path.display(), out.display());
    }
    Ok(files.len())
}

/// Refine a PONI geometry against picked ring points
pub fn calibrate(args: &CalibrateArgs) -> Result<()> {
    let initial = read_poni(&args.poni).with_context(|| format!("cannot read {}", args.poni.display()))?;
    let calibrant = if Path::new(&args.calibrant).is_file() {
        Calibrant::from_file(&args.calibrant)?
    } else {
        Calibrant::by_name(&args.calibrant)?
    };
    let picked = PickedRingPoints::from_csv(&args.points)
        .with_context(|| format!("cannot read points {}", args.points.display()))?;
    let options = RefinementOptions {
        refine_rotations: !args.fix_rotations,
        refine_wavelength: args.refine_wavelength,
        ..RefinementOptions::default()
    };

    let result = refine(&initial, &picked, &calibrant, &options, None)?;
    write_poni(&args.output, &result.parameters)?;

    let p = &result.parameters;
    println!("calibrant       {}", calibrant.name);
    println!("points          {}", picked.len());
    println!("iterations      {}", result.iterations);
    println!("rms residual    {:.3e} rad", result.rms_residual);
    println!("distance        {:.4} mm", p.distance * 1e3);
    println!("poni1, poni2    {:.4} mm, {:.4} mm", p.poni1 * 1e3, p.poni2 * 1e3);
    println!(
        "rot1, rot2      {:.5}°, {:.5}°",
        p.rot1.to_degrees(),
        p.rot2.to_degrees()
    );
    println!("wavelength      {:.6} Å", p.wavelength_angstrom());
    Ok(())
}

/// Write the background-subtracted pattern
pub fn background(args: &BackgroundArgs) -> Result<()> {
    let pattern = load_pattern(&args.input).with_context(|| format!("cannot read {}", args.input.display()))?;
    let params = AutoBackground {
        smooth_width: args.width,
        iterations: args.iterations,
        poly_order: args.order,
        roi: args.xmin.zip(args.xmax),
    };
    let (x, y) = pattern.data();
    let bkg = extract_background(&x, &y, &params)?;
    let subtracted: Vec<f64> = y.iter().zip(&bkg).map(|(v, b)| v - b).collect();

    let limit = |p: Pattern| match params.roi {
        Some((lo, hi)) => p.limit(lo.min(hi), lo.max(hi)),
        None => p,
    };
    let header = format!(
        "Background removed from {}\nwidth {} iterations {} order {}",
        args.input.display(),
        params.smooth_width,
        params.iterations,
        params.poly_order
    );
    let result = limit(Pattern::new(x.clone(), subtracted, &pattern.name)?);
    save_pattern(&args.output, &result, &header, "x")?;
    if let Some(path) = &args.background_output {
        let bkg_pattern = limit(Pattern::new(x, bkg, &format!("{}_bkg", pattern.name))?);
        save_pattern(path, &bkg_pattern, &header, "x")?;
    }
    Ok(())
}

/// Print the line positions of a phase
pub fn phase(args: &PhaseArgs) -> Result<()> {
    let mut phases = PhaseModel::new();
    let is_cif = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cif"));
    let index = if is_cif {
        phases.add_cif(&args.input, args.wavelength, args.d_min, args.min_intensity)?
    } else {
        phases.add_jcpds(&args.input)?
    };
    phases.set_pressure_temperature(index, args.pressure, args.temperature)?;

    let entry = phases.phase(index)?;
    let unit: Unit = args.unit.into();
    let positions = phases.line_positions(index, args.wavelength, unit)?;
    println!(
        "{}  {}  P = {} GPa  T = {} K  V = {:.4} Å³",
        entry.jcpds.name,
        entry.jcpds.symmetry(),
        args.pressure,
        args.temperature,
        entry.jcpds.volume()
    );
    println!("{:>4} {:>4} {:>4} {:>10} {:>12} {:>8}", "h", "k", "l", "d", unit.label(), "I");
    let reachable = entry
        .jcpds
        .reflections()
        .iter()
        .filter(|r| args.wavelength / (2.0 * r.d) < 1.0);
    for (r, (x, intensity)) in reachable.zip(&positions) {
        println!(
            "{:>4} {:>4} {:>4} {:>10.5} {:>12.5} {:>8.2}",
            r.h, r.k, r.l, r.d, x, intensity
        );
    }
    if let Some(path) = &args.save {
        phases.save(index, path)?;
        log::info!("phase written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collect_images_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b_002.tif", "a_001.tif", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = collect_images(&[dir.path().to_path_buf()], false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_001.tif", "b_002.tif"]);
    }

    #[test]
    fn test_collect_images_missing_input() {
        assert!(collect_images(&[PathBuf::from("/no/such/file.tif")], false).is_err());
    }

    #[test]
    fn test_pattern_path() {
        let out = pattern_path(Path::new("/data/run/img_01.tif"), None, false);
        assert_eq!(out, PathBuf::from("/data/run/img_01.xy"));
        let out = pattern_path(Path::new("/data/run/img_01.tif"), Some(Path::new("/out")), true);
        assert_eq!(out, PathBuf::from("/out/img_01.chi"));
    }
}
