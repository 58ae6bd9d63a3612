//! Error types for configuration loading.
//!
//! Unresolvable placeholders are not errors: placeholder
//! resolution is best-effort and leaves unknown values untouched.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to load a single configuration file.
#[derive(Error, Debug)]
pub enum FileLoadError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Config file {} must contain a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },
}

impl FileLoadError {
    /// Build a read error, mapping `NotFound` I/O errors to [`FileLoadError::NotFound`].
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            FileLoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            FileLoadError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn parse(path: &Path, err: impl std::fmt::Display) -> Self {
        FileLoadError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// The file this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            FileLoadError::NotFound { path }
            | FileLoadError::Read { path, .. }
            | FileLoadError::Parse { path, .. }
            | FileLoadError::NotAMapping { path } => path,
        }
    }
}

/// Terminal error of a load pipeline run (`init` or `reload`).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    FileLoad(#[from] FileLoadError),

    #[error("Failed to resolve include {}: {source}", path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: FileLoadError,
    },

    #[error("Include entry {index} in {} is not a path string", root.display())]
    InvalidInclude { index: usize, root: PathBuf },

    #[error("Config loader has not been initialized")]
    NotInitialized,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
