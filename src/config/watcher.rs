//! Debounced file watcher backing hot reload.
//!
//! Watches the parent directory of every registered file (non-recursively)
//! and forwards the paths touched by each debounced batch of filesystem
//! events to a change handler. Deciding which paths matter is left to the
//! handler.

use notify::{RecommendedWatcher, Watcher};
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, mpsc};
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Running watcher. Dropping it stops the watch and its event thread.
pub struct FileWatcher {
    debouncer: Mutex<Debouncer<RecommendedWatcher>>,
    watched_dirs: Mutex<HashSet<PathBuf>>,
}

impl FileWatcher {
    /// Start the watcher. `on_change` runs on a dedicated thread with the
    /// deduplicated paths of each debounced batch.
    pub fn start<F>(config: &WatcherConfig, on_change: F) -> Result<Self, notify::Error>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        let (notify_tx, notify_rx) = mpsc::channel();
        let debouncer = new_debouncer(config.debounce_duration, notify_tx)?;

        std::thread::Builder::new()
            .name("live-config-watcher".into())
            .spawn(move || process_notify_events(notify_rx, on_change))
            .map_err(|e| notify::Error::generic(&e.to_string()))?;

        Ok(Self {
            debouncer: Mutex::new(debouncer),
            watched_dirs: Mutex::new(HashSet::new()),
        })
    }

    /// Watch the directory containing `file`. Directories are watched once.
    pub fn watch_file(&self, file: &Path) -> Result<(), notify::Error> {
        let Some(dir) = file.parent() else {
            return Ok(());
        };

        let mut watched = self
            .watched_dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if watched.contains(dir) {
            return Ok(());
        }

        self.debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        info!("Watching config directory: {}", dir.display());
        watched.insert(dir.to_path_buf());
        Ok(())
    }
}

/// Process events from the notify debouncer until the debouncer is dropped.
fn process_notify_events<F>(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    on_change: F,
) where
    F: Fn(Vec<PathBuf>),
{
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let paths = changed_paths(events);
                if !paths.is_empty() {
                    debug!("File changes detected: {:?}", paths);
                    on_change(paths);
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
            }
            Err(_) => {
                info!("Config watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Deduplicate the paths of a debounced batch, keeping first-seen order.
fn changed_paths(events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| {
            matches!(
                event.kind,
                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
            )
        })
        .map(|event| event.path)
        .filter(|path| seen.insert(path.clone()))
        .collect()
}
