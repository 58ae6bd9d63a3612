//! Parsed file content cache with change notifications.
//!
//! The loader never reads files itself: every root and include file goes
//! through a [`ConfigCache`]. In hot-reload mode the filesystem implementation
//! watches each loaded file and broadcasts a [`FileChange`] after re-parsing it.

use super::watcher::{FileWatcher, WatcherConfig};
use crate::error::FileLoadError;
use crate::paths::normalize_path;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Identifies a cached file that changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Directory containing the file.
    pub file_root: PathBuf,
    /// File name within `file_root`.
    pub file_name: OsString,
}

impl FileChange {
    pub fn from_path(path: &Path) -> Option<Self> {
        Some(Self {
            file_root: path.parent()?.to_path_buf(),
            file_name: path.file_name()?.to_os_string(),
        })
    }

    /// Reconstructed, normalized path of the changed file.
    pub fn path(&self) -> PathBuf {
        normalize_path(&self.file_root.join(&self.file_name))
    }
}

/// Per-load options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Watch the file and re-parse it when it changes.
    pub hot_reload: bool,
}

/// Source of parsed configuration files.
#[async_trait]
pub trait ConfigCache: Send + Sync {
    /// Parsed content of the file at `path`. Always a mapping.
    async fn load(&self, path: &Path, options: LoadOptions) -> Result<Value, FileLoadError>;

    /// Receive a notification whenever a hot-reloaded file changes.
    fn subscribe(&self) -> broadcast::Receiver<FileChange>;
}

/// Parse file content as JSON (`.json`) or YAML (anything else).
///
/// An empty document is an empty mapping; any other non-mapping is rejected.
pub fn parse_content(path: &Path, content: &str) -> Result<Value, FileLoadError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let value = if content.trim().is_empty() {
        Value::Null
    } else if is_json {
        serde_json::from_str::<Value>(content).map_err(|e| FileLoadError::parse(path, e))?
    } else {
        serde_yaml::from_str::<Value>(content).map_err(|e| FileLoadError::parse(path, e))?
    };

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(FileLoadError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// State shared with the watcher thread.
struct CacheState {
    entries: Mutex<HashMap<PathBuf, Value>>,
    /// Event path as reported by the watcher → cache key.
    tracked: Mutex<HashMap<PathBuf, PathBuf>>,
    changes: broadcast::Sender<FileChange>,
}

impl CacheState {
    fn cached(&self, path: &Path) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn store(&self, path: &Path, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), value);
    }

    fn evict(&self, path: &Path) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    fn is_tracked(&self, path: &Path) -> bool {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|key| key == path)
    }

    /// Handle a debounced batch from the watcher.
    fn on_paths_changed(&self, paths: Vec<PathBuf>) {
        for event_path in paths {
            let key = self
                .tracked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&normalize_path(&event_path))
                .cloned();
            let Some(key) = key else {
                continue;
            };

            self.evict(&key);
            match std::fs::read_to_string(&key)
                .map_err(|e| FileLoadError::from_io(&key, e))
                .and_then(|content| parse_content(&key, &content))
            {
                Ok(value) => {
                    debug!("Re-cached config file {}", key.display());
                    self.store(&key, value);
                }
                Err(e) => warn!("Configuration {} is invalid: {}", key.display(), e),
            }

            if let Some(change) = FileChange::from_path(&key) {
                // No receivers simply means nobody is listening yet.
                let _ = self.changes.send(change);
            }
        }
    }
}

/// Filesystem-backed [`ConfigCache`].
pub struct FsConfigCache {
    state: Arc<CacheState>,
    watcher_config: WatcherConfig,
    watcher: Mutex<Option<FileWatcher>>,
}

impl FsConfigCache {
    pub fn new() -> Self {
        Self::with_watcher_config(WatcherConfig::default())
    }

    pub fn with_watcher_config(watcher_config: WatcherConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(CacheState {
                entries: Mutex::new(HashMap::new()),
                tracked: Mutex::new(HashMap::new()),
                changes,
            }),
            watcher_config,
            watcher: Mutex::new(None),
        }
    }

    /// Drop any cached content for `path`; the next load re-reads the file.
    pub fn invalidate(&self, path: &Path) {
        self.state.evict(&normalize_path(path));
    }

    /// Whether `path` is watched for changes.
    pub fn is_watched(&self, path: &Path) -> bool {
        self.state.is_tracked(&normalize_path(path))
    }

    /// Register `path` with the watcher, starting it on first use.
    ///
    /// Failures only disable hot reload for this file; the load still succeeds.
    fn track(&self, path: &Path) {
        if self.state.is_tracked(path) {
            return;
        }

        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.is_none() {
            let state = Arc::clone(&self.state);
            match FileWatcher::start(&self.watcher_config, move |paths| {
                state.on_paths_changed(paths)
            }) {
                Ok(started) => *watcher = Some(started),
                Err(e) => {
                    warn!(
                        "Failed to start config file watcher: {}. Hot reload disabled.",
                        e
                    );
                    return;
                }
            }
        }

        let Some(active) = watcher.as_ref() else {
            return;
        };
        if let Err(e) = active.watch_file(path) {
            warn!("Failed to watch {}: {}", path.display(), e);
            return;
        }

        // The watcher may report the canonical form of the path (e.g. through
        // a symlinked directory), so register both spellings.
        let mut tracked = self
            .state
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracked.insert(path.to_path_buf(), path.to_path_buf());
        if let (Some(dir), Some(name)) = (path.parent(), path.file_name())
            && let Ok(canonical_dir) = std::fs::canonicalize(dir)
        {
            tracked.insert(canonical_dir.join(name), path.to_path_buf());
        }
    }
}

impl Default for FsConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigCache for FsConfigCache {
    async fn load(&self, path: &Path, options: LoadOptions) -> Result<Value, FileLoadError> {
        let path = normalize_path(path);

        let value = match self.state.cached(&path) {
            Some(value) => value,
            None => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| FileLoadError::from_io(&path, e))?;
                let value = parse_content(&path, &content)?;
                debug!("Cached config file {}", path.display());
                self.state.store(&path, value.clone());
                value
            }
        };

        if options.hot_reload {
            self.track(&path);
        }

        Ok(value)
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.state.changes.subscribe()
    }
}
