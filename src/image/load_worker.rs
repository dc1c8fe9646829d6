/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Background image loader
//!
//! File decoding runs on its own thread so the foreground keeps draining
//! integration results while a large frame is read. Requests are keyed by
//! configuration; a newer request supersedes older ones for the same key.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::errors::{ImageError, Result};
use super::loader::{self, FrameMetadata, ImageSource};

/// A decoded frame with the source it was read from
pub struct LoadedFrame {
    pub raw: Array2<f32>,
    pub metadata: FrameMetadata,
    pub source: Box<dyn ImageSource>,
}

/// A finished load
pub struct LoadOutcome {
    pub configuration: usize,
    pub generation: u64,
    pub path: PathBuf,
    pub result: Result<LoadedFrame>,
}

/// Reads frame `index` of a file
pub type LoadFn = fn(&Path, usize) -> Result<LoadedFrame>;

/// Open `path` and decode frame `index`
pub fn load_file(path: &Path, index: usize) -> Result<LoadedFrame> {
    let mut source = loader::open(path)?;
    let (raw, metadata) = source.read(index)?;
    Ok(LoadedFrame {
        raw,
        metadata,
        source,
    })
}

struct Job {
    configuration: usize,
    path: PathBuf,
    index: usize,
    generation: u64,
}

type Generations = Arc<Mutex<HashMap<usize, u64>>>;

fn is_current(generations: &Generations, configuration: usize, generation: u64) -> bool {
    generations
        .lock()
        .map(|g| g.get(&configuration).copied() == Some(generation))
        .unwrap_or(false)
}

/// Worker thread decoding image files off the foreground
pub struct LoadWorker {
    sender: Option<Sender<Job>>,
    results: Receiver<LoadOutcome>,
    generations: Generations,
    handle: Option<JoinHandle<()>>,
}

impl Default for LoadWorker {
    fn default() -> Self {
        Self::spawn()
    }
}

impl LoadWorker {
    /// Spawn a worker reading files with [`load_file`]
    pub fn spawn() -> Self {
        Self::spawn_with(load_file)
    }

    /// Spawn a worker reading files with `load`
    pub fn spawn_with(load: LoadFn) -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (result_tx, result_rx) = unbounded::<LoadOutcome>();
        let generations: Generations = Arc::new(Mutex::new(HashMap::new()));
        let worker_generations = Arc::clone(&generations);

        let handle = thread::spawn(move || {
            for job in job_rx {
                if !is_current(&worker_generations, job.configuration, job.generation) {
                    log::debug!("skipping superseded load of {}", job.path.display());
                    continue;
                }
                let result = load(&job.path, job.index);
                if !is_current(&worker_generations, job.configuration, job.generation) {
                    log::debug!("dropping superseded load of {}", job.path.display());
                    continue;
                }
                let outcome = LoadOutcome {
                    configuration: job.configuration,
                    generation: job.generation,
                    path: job.path,
                    result,
                };
                if result_tx.send(outcome).is_err() {
                    break;
                }
            }
        });

        Self {
            sender: Some(job_tx),
            results: result_rx,
            generations,
            handle: Some(handle),
        }
    }

    /// Queue frame `index` of `path` for `configuration`
    pub fn submit(&self, configuration: usize, path: PathBuf, index: usize) -> Result<u64> {
        let generation = {
            let mut generations = self
                .generations
                .lock()
                .map_err(|_| ImageError::LoaderStopped)?;
            let entry = generations.entry(configuration).or_insert(0);
            *entry += 1;
            *entry
        };
        let sender = self.sender.as_ref().ok_or(ImageError::LoaderStopped)?;
        sender
            .send(Job {
                configuration,
                path,
                index,
                generation,
            })
            .map_err(|_| ImageError::LoaderStopped)?;
        Ok(generation)
    }

    /// Cancel every pending load
    pub fn cancel_all(&self) {
        if let Ok(mut generations) = self.generations.lock() {
            for g in generations.values_mut() {
                *g += 1;
            }
        }
    }

    /// Wait up to `timeout` for the next finished load
    pub fn recv_timeout(&self, timeout: Duration) -> Option<LoadOutcome> {
        match self.results.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Finished loads whose generation is still current
    pub fn drain_current(&self) -> Vec<LoadOutcome> {
        self.results
            .try_iter()
            .filter(|o| is_current(&self.generations, o.configuration, o.generation))
            .collect()
    }
}

impl Drop for LoadWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use ndarray_npy::write_npy;
    use std::time::Instant;
    use tempfile::tempdir;

    fn slow_load(path: &Path, index: usize) -> Result<LoadedFrame> {
        thread::sleep(Duration::from_millis(300));
        load_file(path, index)
    }

    #[test]
    fn test_loads_requested_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.npy");
        let stack = Array3::from_shape_fn((3, 4, 5), |(k, _, _)| k as f32);
        write_npy(&path, &stack).unwrap();

        let worker = LoadWorker::spawn();
        let generation = worker.submit(2, path.clone(), 1).unwrap();
        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.configuration, 2);
        assert_eq!(outcome.generation, generation);
        assert_eq!(outcome.path, path);
        let frame = outcome.result.unwrap();
        assert_eq!(frame.raw.dim(), (4, 5));
        assert!(frame.raw.iter().all(|&v| v == 1.0));
        assert_eq!(frame.metadata.index, 1);
        assert_eq!(frame.metadata.series_len, 3);
        assert_eq!(frame.source.len(), 3);
    }

    #[test]
    fn test_missing_file_reports_error() {
        let dir = tempdir().unwrap();
        let worker = LoadWorker::spawn();
        worker.submit(0, dir.path().join("absent.tif"), 0).unwrap();
        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(outcome.result.is_err());
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.npy");
        let second = dir.path().join("second.npy");
        write_npy(&first, &Array2::<f32>::zeros((4, 4))).unwrap();
        write_npy(&second, &Array2::<f32>::ones((4, 4))).unwrap();

        let worker = LoadWorker::spawn_with(slow_load);
        worker.submit(0, first, 0).unwrap();
        worker.submit(0, second.clone(), 0).unwrap();
        thread::sleep(Duration::from_millis(900));
        let current = worker.drain_current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].path, second);
    }

    #[test]
    fn test_submit_returns_before_slow_load_finishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.npy");
        write_npy(&path, &Array2::<f32>::ones((4, 4))).unwrap();

        let worker = LoadWorker::spawn_with(slow_load);
        let start = Instant::now();
        worker.submit(0, path, 0).unwrap();
        assert!(worker.drain_current().is_empty());
        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(worker.recv_timeout(Duration::from_secs(10)).is_some());
    }
}
