//! Live configuration loading.
//!
//! Builds one configuration tree from a root file, a default tree, included
//! files and placeholders, and keeps it current as files change on disk.
//!
//! ## Pipeline
//! 1. **Root** - loaded through a [`ConfigCache`]
//! 2. **Defaults** - the root is deep-merged over the default tree
//! 3. **Includes** - files listed under `includes` fill missing keys
//! 4. **Placeholders** - `@reference:` and `@environment:` leaves are resolved
//!
//! ## Placeholders
//! - `@reference:server.host` - value at a dotted path in the same tree
//! - `@environment:APP:PORT:number` - environment variable `PORT` as a number
//! - `@environment:APP:TAGS:string:array` - comma-split list

pub mod cache;
pub mod includes;
pub mod loader;
pub mod merge;
pub mod placeholders;
pub mod tree;
pub mod watcher;

pub use cache::{ConfigCache, FileChange, FsConfigCache, LoadOptions};
pub use includes::resolve_includes;
pub use loader::{
    ChangeOutcome, ConfigLoader, ConfigLoaderBuilder, DefaultConfig, LoadedConfig, LoaderOptions,
    LoaderState,
};
pub use merge::{MergeCustomizer, fill_missing, merge};
pub use placeholders::{EnvLookup, Placeholder, ValueKind, resolve_placeholders};
pub use tree::TreePath;
pub use watcher::WatcherConfig;
