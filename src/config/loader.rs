//! Configuration loader with defaults, includes, placeholders and hot reload.
//!
//! Every pipeline run rebuilds the tree from scratch:
//! 1. Load the root file through the cache
//! 2. Merge it over the default tree (with the optional customizer)
//! 3. Fold in includes
//! 4. Resolve `@reference:` / `@environment:` placeholders
//!
//! The result is published with a single atomic swap. A failed run leaves the
//! previously published snapshot in place.

use super::cache::{ConfigCache, FileChange, LoadOptions};
use super::includes::resolve_includes;
use super::merge::{MergeCustomizer, merge};
use super::placeholders::resolve_placeholders;
use super::tree::TreePath;
use crate::error::{ConfigError, ConfigResult};
use crate::events::{EventRegistry, SystemEvent};
use crate::paths::absolute_path;
use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, broadcast::error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Baseline tree every load is merged over.
#[derive(Clone)]
pub enum DefaultConfig {
    Tree(Value),
    /// Invoked on every pipeline run.
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultConfig {
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        DefaultConfig::Producer(Arc::new(f))
    }

    /// The default tree for one run. Anything but a mapping counts as empty.
    pub fn produce(&self) -> Value {
        let value = match self {
            DefaultConfig::Tree(value) => value.clone(),
            DefaultConfig::Producer(f) => f(),
        };
        match value {
            Value::Object(_) => value,
            _ => Value::Object(Map::new()),
        }
    }
}

impl Default for DefaultConfig {
    fn default() -> Self {
        DefaultConfig::Tree(Value::Object(Map::new()))
    }
}

impl From<Value> for DefaultConfig {
    fn from(value: Value) -> Self {
        DefaultConfig::Tree(value)
    }
}

impl std::fmt::Debug for DefaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultConfig::Tree(value) => f.debug_tuple("Tree").field(value).finish(),
            DefaultConfig::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Loader lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// No pipeline has completed yet.
    Uninitialized,
    /// A pipeline run is in progress.
    Loading,
    /// The last run succeeded.
    Published,
    /// The last run failed; any earlier snapshot is still served.
    Failed,
}

fn state_to_u8(state: LoaderState) -> u8 {
    match state {
        LoaderState::Uninitialized => 0,
        LoaderState::Loading => 1,
        LoaderState::Published => 2,
        LoaderState::Failed => 3,
    }
}

fn u8_to_state(val: u8) -> LoaderState {
    match val {
        1 => LoaderState::Loading,
        2 => LoaderState::Published,
        3 => LoaderState::Failed,
        _ => LoaderState::Uninitialized,
    }
}

/// What a file change notification led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The file contributes to the configuration and it was reloaded.
    Reloaded,
    /// The file is not part of the current configuration.
    Ignored,
    /// The changed file could not be loaded; nothing was reloaded.
    Invalid,
}

/// A published configuration snapshot.
///
/// Serializes to its metadata only; the tree is rendered on its own.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedConfig {
    /// Fully resolved configuration tree.
    #[serde(skip)]
    pub config: Arc<Value>,
    /// Files folded into `config`: root first, then includes in order.
    pub files: Vec<PathBuf>,
    /// Incremented on every successful pipeline run; 0 before the first.
    pub generation: u64,
    /// When this snapshot was published.
    pub loaded_at: Option<DateTime<Utc>>,
}

impl LoadedConfig {
    fn empty() -> Self {
        Self {
            config: Arc::new(Value::Object(Map::new())),
            files: Vec::new(),
            generation: 0,
            loaded_at: None,
        }
    }
}

/// Loader construction options.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Watch contributing files and reload when they change.
    pub hot_reload: bool,
    pub defaults: DefaultConfig,
    pub customizer: Option<Arc<dyn MergeCustomizer>>,
    /// Receives [`SystemEvent::ConfigChanged`] after each successful reload.
    pub events: Arc<EventRegistry>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            hot_reload: true,
            defaults: DefaultConfig::default(),
            customizer: None,
            events: Arc::new(EventRegistry::new()),
        }
    }
}

/// Builder for [`ConfigLoader`].
#[derive(Default)]
pub struct ConfigLoaderBuilder {
    options: LoaderOptions,
}

impl ConfigLoaderBuilder {
    pub fn hot_reload(mut self, enabled: bool) -> Self {
        self.options.hot_reload = enabled;
        self
    }

    pub fn defaults(mut self, defaults: impl Into<DefaultConfig>) -> Self {
        self.options.defaults = defaults.into();
        self
    }

    pub fn customizer(mut self, customizer: impl MergeCustomizer + 'static) -> Self {
        self.options.customizer = Some(Arc::new(customizer));
        self
    }

    pub fn events(mut self, events: Arc<EventRegistry>) -> Self {
        self.options.events = events;
        self
    }

    pub fn build(self, cache: Arc<dyn ConfigCache>) -> ConfigLoader {
        ConfigLoader::new(cache, self.options)
    }
}

/// Owns the published configuration and drives (re)loads.
pub struct ConfigLoader {
    cache: Arc<dyn ConfigCache>,
    options: LoaderOptions,
    current: ArcSwap<LoadedConfig>,
    root_path: ArcSwapOption<PathBuf>,
    state: AtomicU8,
    /// Serializes pipeline runs.
    reload_lock: Mutex<()>,
}

impl ConfigLoader {
    pub fn new(cache: Arc<dyn ConfigCache>, options: LoaderOptions) -> Self {
        Self {
            cache,
            options,
            current: ArcSwap::from_pointee(LoadedConfig::empty()),
            root_path: ArcSwapOption::empty(),
            state: AtomicU8::new(state_to_u8(LoaderState::Uninitialized)),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::default()
    }

    /// Load `root_path` for the first time.
    ///
    /// On success the root path and contributing files are remembered for
    /// later reloads. No change event is emitted.
    pub async fn init(&self, root_path: impl AsRef<Path>) -> ConfigResult<()> {
        let root = absolute_path(root_path.as_ref());
        let _guard = self.reload_lock.lock().await;

        match self.run_pipeline(&root).await {
            Ok((config, files)) => {
                self.root_path.store(Some(Arc::new(root)));
                let snapshot = self.publish(config, files);
                info!(
                    files = snapshot.files.len(),
                    "Configuration loaded from {}",
                    snapshot.files[0].display()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Config load failed: {}", e);
                Err(e)
            }
        }
    }

    /// Re-run the pipeline for the stored root path.
    ///
    /// Emits [`SystemEvent::ConfigChanged`] on success. On failure the
    /// previous snapshot stays published and the error is returned.
    pub async fn reload(&self) -> ConfigResult<()> {
        let guard = self.reload_lock.lock().await;
        let root = self.root_path.load_full().ok_or(ConfigError::NotInitialized)?;

        match self.run_pipeline(&root).await {
            Ok((config, files)) => {
                let snapshot = self.publish(config, files);
                drop(guard);
                info!(
                    generation = snapshot.generation,
                    "Configuration reloaded successfully"
                );
                self.options.events.emit(SystemEvent::ConfigChanged);
                Ok(())
            }
            Err(e) => {
                warn!("Config reload failed: {}. Keeping current config.", e);
                Err(e)
            }
        }
    }

    /// React to a change notification from the cache.
    ///
    /// The changed file is re-fetched first; an unloadable file never triggers
    /// a reload. Only files in the current contributing set cause one.
    pub async fn on_file_changed(&self, change: &FileChange) -> ConfigResult<ChangeOutcome> {
        let path = change.path();

        if let Err(e) = self.cache.load(&path, self.load_options()).await {
            warn!("Configuration {} is invalid: {}", path.display(), e);
            return Ok(ChangeOutcome::Invalid);
        }

        let contributes = self.current.load().files.contains(&path);
        if !contributes {
            debug!("Ignoring change to non-contributing file {}", path.display());
            return Ok(ChangeOutcome::Ignored);
        }

        info!("Config change detected: {}", path.display());
        self.reload().await?;
        Ok(ChangeOutcome::Reloaded)
    }

    /// Spawn a task that feeds the cache's change notifications into
    /// [`ConfigLoader::on_file_changed`]. Failed reloads are logged only.
    pub fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.cache.subscribe();
        let loader = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => match loader.on_file_changed(&change).await {
                        Ok(outcome) => debug!(?outcome, "Handled file change"),
                        Err(e) => warn!("Config reload failed: {}", e),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed file change notifications; reloading");
                        if let Err(e) = loader.reload().await {
                            warn!("Config reload failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("File change channel closed, stopping");
                        break;
                    }
                }
            }
        })
    }

    /// The current configuration tree; `{}` before the first successful load.
    pub fn get(&self) -> Arc<Value> {
        Arc::clone(&self.current.load().config)
    }

    /// The current snapshot, including its contributing files.
    pub fn snapshot(&self) -> Arc<LoadedConfig> {
        self.current.load_full()
    }

    pub fn contributing_files(&self) -> Vec<PathBuf> {
        self.current.load().files.clone()
    }

    /// Value at a dotted path in the current tree.
    pub fn value_at(&self, path: &str) -> Option<Value> {
        let path = TreePath::parse(path)?;
        path.get(&self.current.load().config).cloned()
    }

    pub fn state(&self) -> LoaderState {
        u8_to_state(self.state.load(Ordering::Acquire))
    }

    pub fn root_path(&self) -> Option<PathBuf> {
        self.root_path.load_full().map(|p| p.as_ref().clone())
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            hot_reload: self.options.hot_reload,
        }
    }

    fn set_state(&self, state: LoaderState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    /// Build a fresh tree for `root`. Callers hold `reload_lock`.
    async fn run_pipeline(&self, root: &Path) -> ConfigResult<(Value, Vec<PathBuf>)> {
        self.set_state(LoaderState::Loading);
        let result = self.build_tree(root).await;
        if result.is_err() {
            self.set_state(LoaderState::Failed);
        }
        result
    }

    async fn build_tree(&self, root: &Path) -> ConfigResult<(Value, Vec<PathBuf>)> {
        let options = self.load_options();

        let defaults = self.options.defaults.produce();
        let loaded = self.cache.load(root, options).await?;
        debug!("Loaded root config {}", root.display());

        let merged = merge(defaults, loaded, self.options.customizer.as_deref());
        let (resolved, files) = resolve_includes(self.cache.as_ref(), options, root, merged).await?;
        debug!(includes = files.len() - 1, "Resolved includes");

        Ok((resolve_placeholders(resolved), files))
    }

    fn publish(&self, config: Value, files: Vec<PathBuf>) -> Arc<LoadedConfig> {
        let snapshot = Arc::new(LoadedConfig {
            config: Arc::new(config),
            files,
            generation: self.current.load().generation + 1,
            loaded_at: Some(Utc::now()),
        });
        self.current.store(Arc::clone(&snapshot));
        self.set_state(LoaderState::Published);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cache::FsConfigCache;
    use serde_json::json;
    use tempfile::TempDir;

    fn loader_for(defaults: Value) -> ConfigLoader {
        ConfigLoader::builder()
            .hot_reload(false)
            .defaults(defaults)
            .build(Arc::new(FsConfigCache::new()))
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            LoaderState::Uninitialized,
            LoaderState::Loading,
            LoaderState::Published,
            LoaderState::Failed,
        ] {
            assert_eq!(u8_to_state(state_to_u8(state)), state);
        }
    }

    #[test]
    fn test_default_config_non_mapping_is_empty() {
        assert_eq!(DefaultConfig::from(json!([1, 2])).produce(), json!({}));
        assert_eq!(
            DefaultConfig::producer(|| json!({"a": 1})).produce(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_get_before_init_is_empty() {
        let loader = loader_for(json!({"a": 1}));
        assert_eq!(*loader.get(), json!({}));
        assert_eq!(loader.state(), LoaderState::Uninitialized);
        assert!(loader.contributing_files().is_empty());
    }

    #[tokio::test]
    async fn test_init_merges_defaults() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app.yaml");
        std::fs::write(&root, "server:\n  port: 9000\n").unwrap();

        let loader = loader_for(json!({"server": {"port": 8080, "host": "localhost"}}));
        loader.init(&root).await.unwrap();

        assert_eq!(
            *loader.get(),
            json!({"server": {"port": 9000, "host": "localhost"}})
        );
        assert_eq!(loader.state(), LoaderState::Published);
        assert_eq!(loader.snapshot().generation, 1);
        assert_eq!(loader.root_path(), Some(root.clone()));
        assert_eq!(loader.value_at("server.host"), Some(json!("localhost")));
    }

    #[tokio::test]
    async fn test_init_failure_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let loader = loader_for(json!({"a": 1}));

        let err = loader.init(temp.path().join("missing.yaml")).await.unwrap_err();

        assert!(matches!(err, ConfigError::FileLoad(_)));
        assert_eq!(*loader.get(), json!({}));
        assert_eq!(loader.state(), LoaderState::Failed);
        assert!(loader.root_path().is_none());
    }

    #[tokio::test]
    async fn test_reload_before_init() {
        let loader = loader_for(json!({}));
        assert!(matches!(
            loader.reload().await,
            Err(ConfigError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_customizer_applies_during_load() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app.yaml");
        std::fs::write(&root, "limits:\n  max: 5\n").unwrap();

        let loader = ConfigLoader::builder()
            .hot_reload(false)
            .defaults(json!({"limits": {"max": 10}}))
            .customizer(|d: &Value, l: &Value, _: &str, path: &str| {
                (path == "limits.max").then(|| {
                    json!(d.as_i64().unwrap_or(0).max(l.as_i64().unwrap_or(0)))
                })
            })
            .build(Arc::new(FsConfigCache::new()));
        loader.init(&root).await.unwrap();

        assert_eq!(loader.value_at("limits.max"), Some(json!(10)));
    }
}
