//! Error types for the watch pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration errors. Fatal before any watching begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Root path {} does not exist", path.display())]
    RootMissing { path: PathBuf },

    #[error("Root path {} is not a directory", path.display())]
    RootNotDirectory { path: PathBuf },

    #[error("Cannot resolve root path {}: {reason}", path.display())]
    RootUnresolvable { path: PathBuf, reason: String },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("Failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Errors from the watch source and the monitor lifecycle.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {}: {reason}", path.display())]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Watch source closed unexpectedly")]
    SourceClosed,

    #[error("Monitor is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl WatchError {
    /// True for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, WatchError::Config(_))
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
