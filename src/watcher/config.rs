//! Runtime configuration for a single monitor.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use super::event::KindSet;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Default wait for the second half of a rename.
pub const DEFAULT_RENAME_TIMEOUT: Duration = Duration::from_millis(DEFAULT_DEBOUNCE_MS);

/// Everything the monitor needs, built once at startup.
///
/// `recursive` is always true for the CLI; it stays a field so embedders can
/// watch a single directory level.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub root_path: PathBuf,
    pub recursive: bool,
    pub qualifying_kinds: KindSet,
    /// 0 disables debouncing.
    pub debounce_ms: u64,
    /// Debounce entries older than `eviction_factor * debounce_ms` are dropped.
    pub eviction_factor: u32,
    /// Zero disables periodic eviction.
    pub eviction_interval: Duration,
    pub event_buffer: usize,
    pub dispatch_queue: usize,
    pub shutdown_grace: Duration,
    /// How long the first half of a rename waits for its partner before it
    /// is reported as a move out of the tree.
    pub rename_timeout: Duration,
}

impl WatchConfig {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            recursive: true,
            qualifying_kinds: KindSet::default_qualifying(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            eviction_factor: 4,
            eviction_interval: Duration::from_secs(30),
            event_buffer: 1024,
            dispatch_queue: 64,
            shutdown_grace: Duration::from_secs(2),
            rename_timeout: DEFAULT_RENAME_TIMEOUT,
        }
    }

    pub fn with_kinds(mut self, kinds: KindSet) -> Self {
        self.qualifying_kinds = kinds;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check the root and return its canonical form.
    pub fn validate(&self) -> Result<PathBuf, ConfigError> {
        validate_root(&self.root_path)
    }
}

/// The root must exist and be a directory.
pub fn validate_root(path: &Path) -> Result<PathBuf, ConfigError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::RootMissing {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ConfigError::RootUnresolvable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    if !metadata.is_dir() {
        return Err(ConfigError::RootNotDirectory {
            path: path.to_path_buf(),
        });
    }

    path.canonicalize()
        .map_err(|e| ConfigError::RootUnresolvable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_existing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig::new(temp_dir.path());
        let root = config.validate().unwrap();
        assert!(root.is_absolute());
        assert_eq!(root, temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_validate_missing_root() {
        let config = WatchConfig::new("/does/not/exist");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::RootMissing { .. }));
        assert!(err.to_string().contains("/does/not/exist"));
    }

    #[test]
    fn test_validate_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = WatchConfig::new(&file).validate().unwrap_err();
        assert!(matches!(err, ConfigError::RootNotDirectory { .. }));
    }

    #[test]
    fn test_defaults() {
        let config = WatchConfig::new("/tmp");
        assert!(config.recursive);
        assert_eq!(config.debounce_ms, 200);
        assert_eq!(config.qualifying_kinds, KindSet::default_qualifying());
    }
}
