//! Include file resolution.
//!
//! A root configuration may list further files under `includes`, relative to
//! the root file's directory. Includes only fill gaps: the root (and any
//! earlier include) always wins. Includes are not followed recursively.

use super::cache::{ConfigCache, LoadOptions};
use super::merge::fill_missing;
use crate::error::{ConfigError, ConfigResult};
use crate::paths::resolve_relative;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key listing the files to include.
pub const INCLUDES_KEY: &str = "includes";

/// Fold the includes declared by `config` into it.
///
/// Returns the resolved tree (without the `includes` key) and the contributing
/// files: `root_path` first, then each include in declaration order. Includes
/// load one at a time; the first failure aborts the whole resolution.
pub async fn resolve_includes(
    cache: &dyn ConfigCache,
    options: LoadOptions,
    root_path: &Path,
    mut config: Value,
) -> ConfigResult<(Value, Vec<PathBuf>)> {
    let mut files = vec![root_path.to_path_buf()];

    let include_paths = match config.get(INCLUDES_KEY) {
        Some(Value::Array(entries)) => Some(parse_include_paths(root_path, entries)?),
        _ => None,
    };
    let Some(include_paths) = include_paths else {
        return Ok((config, files));
    };

    for path in include_paths {
        debug!("Loading include {}", path.display());
        let included = cache
            .load(&path, options)
            .await
            .map_err(|source| ConfigError::Include {
                path: path.clone(),
                source,
            })?;
        fill_missing(&mut config, included);
        files.push(path);
    }

    if let Value::Object(map) = &mut config {
        map.shift_remove(INCLUDES_KEY);
    }

    Ok((config, files))
}

fn parse_include_paths(root_path: &Path, entries: &[Value]) -> ConfigResult<Vec<PathBuf>> {
    let root_dir = root_path.parent().unwrap_or_else(|| Path::new(""));
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::String(relative) => Ok(resolve_relative(root_dir, relative)),
            _ => Err(ConfigError::InvalidInclude {
                index,
                root: root_path.to_path_buf(),
            }),
        })
        .collect()
}
