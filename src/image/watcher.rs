/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Directory watcher for newly arriving frames
//!
//! File system events are filtered to supported image extensions and passed
//! through a debouncing thread: the files arriving within one window yield
//! only the last of them. A window opens with its first file and closes
//! after a fixed time, so a steady stream still reports regularly. Failures, including removal of the
//! watched directory, end the watcher with a single `Failed` event.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::errors::{ImageError, Result};
use super::loader::is_supported;

/// Length of a debounce window, counted from its first event
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Interval at which the debouncer checks that the directory still exists
const POLL: Duration = Duration::from_millis(250);

/// What the watcher reports to the foreground
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    NewFile(PathBuf),
    Failed(String),
}

enum RawEvent {
    File(PathBuf),
    Error(String),
}

/// Watches one directory for new image files
pub struct DirectoryWatcher {
    directory: PathBuf,
    watcher: Option<RecommendedWatcher>,
    events: Receiver<WatchEvent>,
    stop: Arc<AtomicBool>,
    debouncer: Option<JoinHandle<()>>,
}

fn is_new_file(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

impl DirectoryWatcher {
    /// Start watching `directory`
    pub fn start<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(ImageError::Watcher(format!("{} is not a directory", directory.display())));
        }

        let (raw_tx, raw_rx) = unbounded::<RawEvent>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_new_file(&event.kind) => {
                for path in event.paths {
                    if is_supported(&path) {
                        let _ = raw_tx.send(RawEvent::File(path));
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                let _ = raw_tx.send(RawEvent::Error(e.to_string()));
            }
        })
        .map_err(|e| ImageError::Watcher(e.to_string()))?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| ImageError::Watcher(e.to_string()))?;

        let (event_tx, event_rx) = unbounded::<WatchEvent>();
        let stop = Arc::new(AtomicBool::new(false));
        let debouncer = {
            let stop = Arc::clone(&stop);
            let directory = directory.clone();
            thread::spawn(move || debounce(raw_rx, event_tx, stop, directory))
        };
        log::info!("watching {} for new images", directory.display());

        Ok(Self {
            directory,
            watcher: Some(watcher),
            events: event_rx,
            stop,
            debouncer: Some(debouncer),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Events that arrived since the last call
    pub fn poll(&self) -> Vec<WatchEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait(&self, timeout: Duration) -> Option<WatchEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stop watching and join the debouncing thread
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the notify handle closes the raw channel
        self.watcher.take();
        if let Some(handle) = self.debouncer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn debounce(raw: Receiver<RawEvent>, out: Sender<WatchEvent>, stop: Arc<AtomicBool>, directory: PathBuf) {
    // Latest file of the open window and the instant the window closes
    let mut pending: Option<(PathBuf, Instant)> = None;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let timeout = match &pending {
            Some((_, deadline)) => deadline.saturating_duration_since(Instant::now()),
            None => POLL,
        };
        match raw.recv_timeout(timeout) {
            Ok(RawEvent::File(path)) => match pending.as_mut() {
                Some((latest, _)) => {
                    log::debug!("debounced {}", latest.display());
                    *latest = path;
                }
                None => pending = Some((path, Instant::now() + DEBOUNCE)),
            },
            Ok(RawEvent::Error(message)) => {
                log::warn!("directory watcher failed: {}", message);
                let _ = out.send(WatchEvent::Failed(message));
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some((path, _)) = pending.take() {
                    if out.send(WatchEvent::NewFile(path)).is_err() {
                        return;
                    }
                }
                if !directory.is_dir() {
                    let message = format!("{} no longer exists", directory.display());
                    log::warn!("directory watcher failed: {}", message);
                    let _ = out.send(WatchEvent::Failed(message));
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
        // A steady stream never times out, so close an expired window here too
        if let Some((_, deadline)) = &pending {
            if Instant::now() >= *deadline {
                if let Some((path, _)) = pending.take() {
                    if out.send(WatchEvent::NewFile(path)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_directory_is_rejected() {
        assert!(matches!(
            DirectoryWatcher::start("/nonexistent/dioptas/dir"),
            Err(ImageError::Watcher(_))
        ));
    }

    #[test]
    fn test_burst_yields_last_file() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::start(dir.path()).unwrap();
        for k in 0..3 {
            fs::write(dir.path().join(format!("burst_{}.tif", k)), b"").unwrap();
        }
        fs::write(dir.path().join("ignored.txt"), b"").unwrap();
        let event = watcher.wait(Duration::from_secs(5));
        assert_eq!(event, Some(WatchEvent::NewFile(dir.path().join("burst_2.tif"))));
        assert_eq!(watcher.wait(Duration::from_millis(400)), None);
    }

    #[test]
    fn test_steady_stream_reports_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::start(dir.path()).unwrap();
        let mut during = Vec::new();
        for k in 0..30 {
            fs::write(dir.path().join(format!("f_{:03}.tif", k)), b"").unwrap();
            thread::sleep(Duration::from_millis(50));
            during.extend(watcher.poll());
        }
        assert!(during.len() >= 3, "only {} events while files arrived", during.len());
        assert!(during.len() < 30);
        assert!(during.iter().all(|e| matches!(e, WatchEvent::NewFile(_))));
    }

    #[test]
    fn test_removed_directory_fails_once() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("frames");
        fs::create_dir(&dir).unwrap();
        let watcher = DirectoryWatcher::start(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        let mut failures = 0;
        while let Some(event) = watcher.wait(Duration::from_secs(2)) {
            if matches!(event, WatchEvent::Failed(_)) {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
    }
}
