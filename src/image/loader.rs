/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Image sources
//!
//! `open` picks a reader from the file extension. Every reader exposes the
//! number of frames in the file and reads a frame as a row-major f32 array.

use ndarray::{Array2, Array3, Axis};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

use super::errors::{ImageError, Result};

/// Extensions `open` understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["tif", "tiff", "npy"];

/// Where a frame came from
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub path: PathBuf,
    pub index: usize,
    pub series_len: usize,
}

/// A file holding one or more frames
pub trait ImageSource: Send {
    /// Number of frames, 1 for single images
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn path(&self) -> &Path;

    /// Read frame `index`
    fn read(&mut self, index: usize) -> Result<(Array2<f32>, FrameMetadata)>;
}

/// Whether `path` has an extension `open` can read
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Open an image file
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn ImageSource>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "tif" | "tiff" => Ok(Box::new(TiffSource::open(path)?)),
        "npy" => Ok(Box::new(NpySource::open(path)?)),
        _ => Err(ImageError::UnsupportedFormat(path.display().to_string())),
    }
}

fn metadata(path: &Path, index: usize, len: usize) -> FrameMetadata {
    FrameMetadata {
        path: path.to_path_buf(),
        index,
        series_len: len,
    }
}

/// Single or multi-page TIFF
pub struct TiffSource {
    path: PathBuf,
    frames: Vec<Array2<f32>>,
}

impl TiffSource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            frames: read_tiff(path)?,
        })
    }
}

impl ImageSource for TiffSource {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&mut self, index: usize) -> Result<(Array2<f32>, FrameMetadata)> {
        let frame = self.frames.get(index).ok_or(ImageError::IndexOutOfRange {
            index,
            len: self.frames.len(),
        })?;
        Ok((frame.clone(), metadata(&self.path, index, self.frames.len())))
    }
}

/// NumPy array, 2D for a single frame or 3D for a series along axis 0
pub struct NpySource {
    path: PathBuf,
    data: Array3<f32>,
}

impl NpySource {
    pub fn open(path: &Path) -> Result<Self> {
        let data = read_npy_stack(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }
}

impl ImageSource for NpySource {
    fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&mut self, index: usize) -> Result<(Array2<f32>, FrameMetadata)> {
        let len = self.len();
        if index >= len {
            return Err(ImageError::IndexOutOfRange { index, len });
        }
        Ok((
            self.data.index_axis(Axis(0), index).to_owned(),
            metadata(&self.path, index, len),
        ))
    }
}

/// Read a 3D stack or a 2D frame of f32 or f64 samples as a stack of f32 frames
fn read_npy_stack(path: &Path) -> Result<Array3<f32>> {
    if let Ok(stack) = Array3::<f32>::read_npy(File::open(path)?) {
        return Ok(stack);
    }
    if let Ok(stack) = Array3::<f64>::read_npy(File::open(path)?) {
        return Ok(stack.mapv(|v| v as f32));
    }
    if let Ok(frame) = Array2::<f32>::read_npy(File::open(path)?) {
        return Ok(frame.insert_axis(Axis(0)));
    }
    Array2::<f64>::read_npy(File::open(path)?)
        .map(|frame| frame.mapv(|v| v as f32).insert_axis(Axis(0)))
        .map_err(|e| ImageError::FormatError(format!("{}: {}", path.display(), e)))
}

/// Decode every page of a grayscale TIFF
pub fn read_tiff<P: AsRef<Path>>(path: P) -> Result<Vec<Array2<f32>>> {
    let path = path.as_ref();
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let mut frames = Vec::new();
    loop {
        let (width, height) = decoder.dimensions()?;
        let (w, h) = (width as usize, height as usize);
        let samples: Vec<f32> = match decoder.read_image()? {
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            other => {
                return Err(ImageError::UnsupportedFormat(format!(
                    "{}: sample type {:?}",
                    path.display(),
                    std::mem::discriminant(&other)
                )))
            }
        };
        if samples.len() != w * h {
            return Err(ImageError::FormatError(format!(
                "{}: expected {} gray samples, found {}",
                path.display(),
                w * h,
                samples.len()
            )));
        }
        let frame =
            Array2::from_shape_vec((h, w), samples).map_err(|e| ImageError::FormatError(e.to_string()))?;
        frames.push(frame);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    log::debug!("read {} TIFF page(s) from {}", frames.len(), path.display());
    Ok(frames)
}

/// Write a single 32-bit float TIFF page
pub fn write_tiff<P: AsRef<Path>>(path: P, frame: &Array2<f32>) -> Result<()> {
    let (h, w) = frame.dim();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path.as_ref())?))?;
    let data: Vec<f32> = frame.iter().copied().collect();
    encoder.write_image::<colortype::Gray32Float>(w as u32, h as u32, &data)?;
    Ok(())
}

/// Write a 16-bit unsigned TIFF page, clamping values into range
pub fn write_tiff_u16<P: AsRef<Path>>(path: P, frame: &Array2<f32>) -> Result<()> {
    let (h, w) = frame.dim();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path.as_ref())?))?;
    let data: Vec<u16> = frame.iter().map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16).collect();
    encoder.write_image::<colortype::Gray16>(w as u32, h as u32, &data)?;
    Ok(())
}

/// Write a frame as a 2D `.npy` file
pub fn write_npy<P: AsRef<Path>>(path: P, frame: &Array2<f32>) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    frame
        .write_npy(writer)
        .map_err(|e| ImageError::FormatError(e.to_string()))
}

/// Place detector modules on a zero-filled canvas
///
/// Each module is shifted by its (row, col) position; positions may be
/// negative, in which case the whole layout is translated so the smallest
/// position lands at the origin. Overlapping pixels take the later module.
pub fn stitch_modules(modules: &[Array2<f32>], positions: &[(i64, i64)]) -> Result<Array2<f32>> {
    if modules.len() != positions.len() {
        return Err(ImageError::FormatError(format!(
            "{} modules but {} positions",
            modules.len(),
            positions.len()
        )));
    }
    if modules.is_empty() {
        return Err(ImageError::FormatError("no modules to stitch".to_string()));
    }
    let min_row = positions.iter().map(|p| p.0).min().unwrap_or(0);
    let min_col = positions.iter().map(|p| p.1).min().unwrap_or(0);
    let mut height = 0usize;
    let mut width = 0usize;
    for (module, &(r, c)) in modules.iter().zip(positions) {
        height = height.max((r - min_row) as usize + module.nrows());
        width = width.max((c - min_col) as usize + module.ncols());
    }
    let mut canvas = Array2::<f32>::zeros((height, width));
    for (module, &(r, c)) in modules.iter().zip(positions) {
        let r0 = (r - min_row) as usize;
        let c0 = (c - min_col) as usize;
        canvas
            .slice_mut(ndarray::s![r0..r0 + module.nrows(), c0..c0 + module.ncols()])
            .assign(module);
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_tiff_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tif");
        let frame = Array2::from_shape_fn((5, 7), |(i, j)| (i * 10 + j) as f32 * 0.5);
        write_tiff(&path, &frame).unwrap();
        let mut source = open(&path).unwrap();
        assert_eq!(source.len(), 1);
        let (read, meta) = source.read(0).unwrap();
        assert_eq!(read, frame);
        assert_eq!(meta.index, 0);
        assert!(source.read(1).is_err());
    }

    #[test]
    fn test_u16_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tiff");
        let frame = Array2::from_shape_fn((4, 3), |(i, j)| (i * 1000 + j) as f32);
        write_tiff_u16(&path, &frame).unwrap();
        assert_eq!(read_tiff(&path).unwrap()[0], frame);
    }

    #[test]
    fn test_npy_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.npy");
        let stack = Array3::from_shape_fn((3, 4, 5), |(k, i, j)| (k * 100 + i * 10 + j) as f32);
        stack.write_npy(File::create(&path).unwrap()).unwrap();
        let mut source = open(&path).unwrap();
        assert_eq!(source.len(), 3);
        let (frame, meta) = source.read(2).unwrap();
        assert_eq!(frame[[1, 2]], 212.0);
        assert_eq!(meta.series_len, 3);
    }

    #[test]
    fn test_npy_f64_series_and_frame() {
        let dir = tempfile::tempdir().unwrap();
        let stack_path = dir.path().join("stack64.npy");
        let stack = Array3::from_shape_fn((2, 3, 4), |(k, i, j)| (k * 100 + i * 10 + j) as f64 + 0.5);
        stack.write_npy(File::create(&stack_path).unwrap()).unwrap();
        let mut source = open(&stack_path).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.read(1).unwrap().0[[2, 3]], 123.5);

        let frame_path = dir.path().join("frame64.npy");
        let frame = Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as f64);
        frame.write_npy(File::create(&frame_path).unwrap()).unwrap();
        let mut source = open(&frame_path).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.read(0).unwrap().0, frame.mapv(|v| v as f32));
    }

    #[test]
    fn test_npy_of_wrong_rank_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.npy");
        ndarray::Array1::from(vec![1.0f32, 2.0]).write_npy(File::create(&path).unwrap()).unwrap();
        assert!(matches!(open(&path), Err(ImageError::FormatError(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(open("frame.cbf"), Err(ImageError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_stitch_modules_with_gap() {
        let a = Array2::from_elem((2, 3), 1.0f32);
        let b = Array2::from_elem((2, 3), 2.0f32);
        let canvas = stitch_modules(&[a, b], &[(0, 0), (0, 5)]).unwrap();
        assert_eq!(canvas.dim(), (2, 8));
        assert_eq!(canvas[[0, 2]], 1.0);
        assert_eq!(canvas[[0, 3]], 0.0);
        assert_eq!(canvas[[1, 7]], 2.0);
    }
}
