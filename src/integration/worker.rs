/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Background integration worker
//!
//! Requests are keyed by (configuration, unit, bins). Submitting a request
//! bumps the generation of its key; the worker skips jobs and drops results
//! whose generation is no longer current, so superseded requests never
//! publish.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::errors::{IntegrationError, Result};
use super::options::IntegrationOptions;
use super::radial::{integrate_1d, IntegratedPattern};
use crate::geometry::{Geometry, Unit};

/// Identity of an integration request for cancellation purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegrationKey {
    pub configuration: usize,
    pub unit: Unit,
    pub bins: usize,
}

/// A 1D integration job
pub struct IntegrationRequest {
    pub configuration: usize,
    pub image: Arc<Array2<f32>>,
    pub mask: Option<Arc<Array2<bool>>>,
    pub geometry: Arc<Geometry>,
    pub options: IntegrationOptions,
}

impl IntegrationRequest {
    pub fn key(&self) -> IntegrationKey {
        IntegrationKey {
            configuration: self.configuration,
            unit: self.options.unit,
            bins: self.options.bins_for(self.image.dim()),
        }
    }
}

/// A published integration result
#[derive(Debug)]
pub struct IntegrationOutcome {
    pub key: IntegrationKey,
    pub generation: u64,
    pub result: Result<IntegratedPattern>,
}

struct Job {
    request: IntegrationRequest,
    key: IntegrationKey,
    generation: u64,
}

type Generations = Arc<Mutex<HashMap<IntegrationKey, u64>>>;

fn is_current(generations: &Generations, key: &IntegrationKey, generation: u64) -> bool {
    generations
        .lock()
        .map(|g| g.get(key).copied() == Some(generation))
        .unwrap_or(false)
}

/// Worker thread running integrations off the foreground
pub struct IntegrationWorker {
    sender: Option<Sender<Job>>,
    results: Receiver<IntegrationOutcome>,
    generations: Generations,
    handle: Option<JoinHandle<()>>,
}

impl IntegrationWorker {
    /// Spawn the worker thread
    pub fn spawn() -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (result_tx, result_rx) = unbounded::<IntegrationOutcome>();
        let generations: Generations = Arc::new(Mutex::new(HashMap::new()));
        let worker_generations = Arc::clone(&generations);

        let handle = thread::spawn(move || {
            for job in job_rx {
                if !is_current(&worker_generations, &job.key, job.generation) {
                    log::debug!("skipping superseded integration {:?}#{}", job.key, job.generation);
                    continue;
                }
                let request = &job.request;
                let result = integrate_1d(
                    request.image.view(),
                    request.mask.as_ref().map(|m| m.view()),
                    &request.geometry,
                    &request.options,
                );
                if !is_current(&worker_generations, &job.key, job.generation) {
                    log::debug!("dropping superseded integration {:?}#{}", job.key, job.generation);
                    continue;
                }
                let outcome = IntegrationOutcome {
                    key: job.key,
                    generation: job.generation,
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

    /// Queue a request, superseding any in-flight request with the same key
    pub fn submit(&self, request: IntegrationRequest) -> Result<u64> {
        let key = request.key();
        let generation = {
            let mut generations = self
                .generations
                .lock()
                .map_err(|_| IntegrationError::WorkerStopped)?;
            let entry = generations.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };
        let sender = self.sender.as_ref().ok_or(IntegrationError::WorkerStopped)?;
        sender
            .send(Job {
                request,
                key,
                generation,
            })
            .map_err(|_| IntegrationError::WorkerStopped)?;
        Ok(generation)
    }

    /// Cancel whatever is in flight for `key`
    pub fn cancel(&self, key: &IntegrationKey) {
        if let Ok(mut generations) = self.generations.lock() {
            if let Some(g) = generations.get_mut(key) {
                *g += 1;
            }
        }
    }

    /// Next published outcome, if one is ready
    pub fn try_recv(&self) -> Option<IntegrationOutcome> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next published outcome
    pub fn recv_timeout(&self, timeout: Duration) -> Option<IntegrationOutcome> {
        match self.results.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Published outcomes whose generation is still current for their key
    pub fn drain_current(&self) -> Vec<IntegrationOutcome> {
        self.results
            .try_iter()
            .filter(|o| is_current(&self.generations, &o.key, o.generation))
            .collect()
    }
}

impl Drop for IntegrationWorker {
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
    use crate::geometry::GeometryParameters;

    fn request(configuration: usize, value: f32) -> IntegrationRequest {
        IntegrationRequest {
            configuration,
            image: Arc::new(Array2::from_elem((32, 32), value)),
            mask: None,
            geometry: Arc::new(Geometry::new(GeometryParameters {
                distance: 0.1,
                poni1: 1.6e-3,
                poni2: 1.6e-3,
                pixel1: 100e-6,
                pixel2: 100e-6,
                ..Default::default()
            })),
            options: IntegrationOptions {
                polarization_correction: false,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_worker_publishes_result() {
        let worker = IntegrationWorker::spawn();
        let generation = worker.submit(request(0, 2.0)).unwrap();
        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.generation, generation);
        let pattern = outcome.result.unwrap();
        assert!(pattern.y.iter().all(|&y| (y - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_only_latest_request_is_current() {
        let worker = IntegrationWorker::spawn();
        for k in 0..5 {
            worker.submit(request(0, k as f32 + 1.0)).unwrap();
        }
        let mut last = None;
        while let Some(outcome) = worker.recv_timeout(Duration::from_millis(500)) {
            last = Some(outcome);
        }
        let last = last.unwrap();
        assert_eq!(last.generation, 5);
        assert!(last.result.unwrap().y.iter().all(|&y| (y - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_cancelled_request_never_publishes() {
        let worker = IntegrationWorker::spawn();
        let req = request(1, 1.0);
        let key = req.key();
        worker.submit(req).unwrap();
        worker.cancel(&key);
        std::thread::sleep(Duration::from_millis(200));
        assert!(worker.drain_current().is_empty());
    }
}
