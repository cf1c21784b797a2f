//! Crate-wide error type.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::window::WindowError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading runs, launching the simulator or assembling data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed log {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot parse run directory name '{name}': {message}")]
    DirectoryName { name: String, message: String },

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no model file matches {pattern}")]
    ModelNotFound { pattern: String },

    #[error("failed to launch simulator `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("simulator did not write {marker} within {waited:?}")]
    SimulationTimeout { marker: PathBuf, waited: Duration },

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
