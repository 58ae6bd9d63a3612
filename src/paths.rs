//! Filesystem path helpers.
//!
//! Contributing files are compared by path when a change notification
//! arrives, so every path the loader records goes through [`normalize_path`]
//! first. This is pure lexical manipulation; symlinks are not resolved.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute (relative to the current directory) and normalize it.
pub fn absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    normalize_path(&absolute)
}

/// Resolve an include path against the directory of the file declaring it.
pub fn resolve_relative(base_dir: &Path, relative: &str) -> PathBuf {
    normalize_path(&base_dir.join(relative))
}

/// Remove `.` components and fold `..` into its parent where possible.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => components.push(Component::Prefix(p)),
            Component::RootDir => components.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `/..` stays at root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(Component::ParentDir),
            },
            Component::Normal(name) => components.push(Component::Normal(name)),
        }
    }

    components.iter().collect()
}
