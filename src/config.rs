//! Configuration module for chime.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the `watch` command)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CHIME_` and use double
//! underscores to separate nested levels:
//! - `CHIME_WATCH__DEBOUNCE_MS=500` sets `watch.debounce_ms`
//! - `CHIME_TONE__FREQUENCY_HZ=880` sets `tone.frequency_hz`
//! - `CHIME_WATCH__QUALIFYING_KINDS=[created,deleted]` sets the kinds

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::notifier::command::CommandConfig;
use crate::notifier::tone::{MAX_DURATION_SECS, ToneSpec};
use crate::watcher::{
    ConfigError, DEFAULT_DEBOUNCE_MS, DEFAULT_RENAME_TIMEOUT, EventKind, KindSet, WatchConfig,
};

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".chime";
/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// What to watch and how to filter it
    #[serde(default)]
    pub watch: WatchSettings,

    /// Tone notifier
    #[serde(default)]
    pub tone: ToneSettings,

    /// Optional external command run per event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory relative paths in this file are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchSettings {
    /// Directory tree to watch
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Event kinds that trigger a notification
    #[serde(default = "default_qualifying_kinds")]
    pub qualifying_kinds: Vec<EventKind>,

    /// Per path/kind suppression window; 0 disables debouncing
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Debounce entries older than this many windows are evicted
    #[serde(default = "default_eviction_factor")]
    pub eviction_factor: u32,

    /// How often to evict stale debounce entries; 0 disables eviction
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,

    /// Capacity of the source -> pipeline channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the pipeline -> dispatcher queue
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue: usize,

    /// Maximum wait for in-flight notifiers on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Wait for the second half of a rename before reporting a move out
    #[serde(default = "default_rename_timeout_ms")]
    pub rename_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ToneSettings {
    /// Play a tone per event
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_duration_secs")]
    pub duration_secs: f32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f32,

    /// 0.0 - 1.0, clamped
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Minimum gap between two tones
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `chime = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_root() -> PathBuf { PathBuf::from(".") }
fn default_qualifying_kinds() -> Vec<EventKind> { vec![EventKind::Created, EventKind::Moved] }
fn default_debounce_ms() -> u64 { DEFAULT_DEBOUNCE_MS }
fn default_eviction_factor() -> u32 { 4 }
fn default_eviction_interval_ms() -> u64 { 30_000 }
fn default_event_buffer() -> usize { 1024 }
fn default_dispatch_queue() -> usize { 64 }
fn default_shutdown_grace_ms() -> u64 { 2000 }
fn default_rename_timeout_ms() -> u64 { DEFAULT_RENAME_TIMEOUT.as_millis() as u64 }
fn default_true() -> bool { true }
fn default_duration_secs() -> f32 { ToneSpec::default().duration_secs }
fn default_sample_rate() -> u32 { ToneSpec::default().sample_rate }
fn default_frequency_hz() -> f32 { ToneSpec::default().frequency_hz }
fn default_volume() -> f32 { ToneSpec::default().volume }
fn default_cooldown_ms() -> u64 { 50 }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchSettings::default(),
            tone: ToneSettings::default(),
            command: None,
            logging: LoggingConfig::default(),
            base_dir: None,
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            qualifying_kinds: default_qualifying_kinds(),
            debounce_ms: default_debounce_ms(),
            eviction_factor: default_eviction_factor(),
            eviction_interval_ms: default_eviction_interval_ms(),
            event_buffer: default_event_buffer(),
            dispatch_queue: default_dispatch_queue(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            rename_timeout_ms: default_rename_timeout_ms(),
        }
    }
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_secs: default_duration_secs(),
            sample_rate: default_sample_rate(),
            frequency_hz: default_frequency_hz(),
            volume: default_volume(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl ToneSettings {
    pub fn spec(&self) -> ToneSpec {
        ToneSpec {
            duration_secs: self.duration_secs,
            sample_rate: self.sample_rate,
            frequency_hz: self.frequency_hz,
            volume: self.volume,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// `explicit` wins over the discovered `.chime/settings.toml`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_workspace_config(),
        };

        let mut figment = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()));

        // Layer in config file if it exists
        if let Some(path) = &config_path {
            figment = figment.merge(Toml::file(path));
        }

        let mut settings: Settings = figment
            // Double underscore separates nesting; single underscore stays.
            .merge(Env::prefixed("CHIME_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        settings.base_dir = config_path.as_deref().and_then(Self::base_dir_for);
        Ok(settings)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        settings.base_dir = Self::base_dir_for(path);
        Ok(settings)
    }

    /// `<ws>/.chime/settings.toml` resolves against `<ws>`, anything else
    /// against the file's own directory.
    fn base_dir_for(config_path: &Path) -> Option<PathBuf> {
        let parent = config_path.parent().filter(|p| !p.as_os_str().is_empty())?;
        let base = if parent.file_name().is_some_and(|n| n == CONFIG_DIR) {
            parent.parent().unwrap_or(parent)
        } else {
            parent
        };
        Some(base.to_path_buf())
    }

    /// Find `.chime/settings.toml` searching from the current directory up.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR).join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Reject settings that cannot produce a working monitor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidSetting {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.tone.sample_rate == 0 {
            return Err(invalid("tone.sample_rate", "must be greater than zero"));
        }
        if !self.tone.duration_secs.is_finite() || self.tone.duration_secs <= 0.0 {
            return Err(invalid("tone.duration_secs", "must be a positive number"));
        }
        if self.tone.duration_secs > MAX_DURATION_SECS {
            return Err(invalid(
                "tone.duration_secs",
                &format!("must be at most {MAX_DURATION_SECS} seconds"),
            ));
        }
        if !self.tone.frequency_hz.is_finite() || self.tone.frequency_hz <= 0.0 {
            return Err(invalid("tone.frequency_hz", "must be a positive number"));
        }
        if !self.tone.volume.is_finite() {
            return Err(invalid("tone.volume", "must be a number"));
        }
        if self.watch.event_buffer == 0 {
            return Err(invalid("watch.event_buffer", "must be greater than zero"));
        }
        if self.watch.dispatch_queue == 0 {
            return Err(invalid("watch.dispatch_queue", "must be greater than zero"));
        }
        if let Some(command) = &self.command {
            if command.program.trim().is_empty() {
                return Err(invalid("command.program", "must not be empty"));
            }
        }
        Ok(())
    }

    /// Root path with relative paths resolved against [`Settings::base_dir`].
    pub fn resolved_root(&self) -> PathBuf {
        let root = &self.watch.root;
        match &self.base_dir {
            Some(base) if root.is_relative() => base.join(root),
            _ => root.clone(),
        }
    }

    /// Build the monitor configuration.
    pub fn watch_config(&self) -> WatchConfig {
        let watch = &self.watch;
        WatchConfig {
            root_path: self.resolved_root(),
            recursive: true,
            qualifying_kinds: watch.qualifying_kinds.iter().copied().collect::<KindSet>(),
            debounce_ms: watch.debounce_ms,
            eviction_factor: watch.eviction_factor,
            eviction_interval: Duration::from_millis(watch.eviction_interval_ms),
            event_buffer: watch.event_buffer,
            dispatch_queue: watch.dispatch_queue,
            shutdown_grace: Duration::from_millis(watch.shutdown_grace_ms),
            rename_timeout: Duration::from_millis(watch.rename_timeout_ms),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in `dir/.chime/`.
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.debounce_ms, 200);
        assert_eq!(
            settings.watch.qualifying_kinds,
            vec![EventKind::Created, EventKind::Moved]
        );
        assert_eq!(settings.tone.spec(), ToneSpec::default());
        assert!(settings.command.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
version = 2

[watch]
root = "watched"
qualifying_kinds = ["created", "deleted", "modified"]
debounce_ms = 0

[tone]
frequency_hz = 880.0
volume = 0.3

[command]
program = "notify-send"
args = ["chime"]
"#,
            )?;

            let settings = Settings::load_from("custom.toml").unwrap();
            assert_eq!(settings.version, 2);
            assert_eq!(settings.watch.debounce_ms, 0);
            assert_eq!(settings.tone.frequency_hz, 880.0);
            assert_eq!(settings.tone.sample_rate, 44_100);

            let command = settings.command.as_ref().unwrap();
            assert_eq!(command.program, "notify-send");
            assert_eq!(command.timeout_ms, 5000);

            let config = settings.watch_config();
            assert!(config.qualifying_kinds.contains(EventKind::Deleted));
            assert!(!config.qualifying_kinds.contains(EventKind::Moved));
            assert_eq!(config.root_path, PathBuf::from("watched"));
            Ok(())
        });
    }

    #[test]
    fn test_layered_config() {
        Jail::expect_with(|jail| {
            jail.create_dir(CONFIG_DIR)?;
            jail.create_file(
                ".chime/settings.toml",
                r#"
[watch]
debounce_ms = 300

[tone]
volume = 0.5
"#,
            )?;
            jail.set_env("CHIME_WATCH__DEBOUNCE_MS", "750");
            jail.set_env("CHIME_TONE__COOLDOWN_MS", "10");

            let settings = Settings::load(None).unwrap();

            // Environment variable overrides config file
            assert_eq!(settings.watch.debounce_ms, 750);
            // Config file value is used when no env var
            assert_eq!(settings.tone.volume, 0.5);
            // Env var adds value not in config
            assert_eq!(settings.tone.cooldown_ms, 10);
            // Relative root resolves against the workspace
            assert!(settings.base_dir.is_some());
            assert!(settings.resolved_root().is_absolute());
            Ok(())
        });
    }

    #[test]
    fn test_env_kinds_list() {
        Jail::expect_with(|jail| {
            jail.set_env("CHIME_WATCH__QUALIFYING_KINDS", "[deleted,modified]");
            let settings = Settings::load(None).unwrap();
            assert_eq!(
                settings.watch.qualifying_kinds,
                vec![EventKind::Deleted, EventKind::Modified]
            );
            Ok(())
        });
    }

    #[test]
    fn test_unknown_kind_is_load_error() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[watch]\nqualifying_kinds = [\"touched\"]\n")?;
            let err = Settings::load_from("bad.toml").unwrap_err();
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.tone.sample_rate = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { ref field, .. }) if field == "tone.sample_rate"
        ));

        let mut settings = Settings::default();
        settings.tone.duration_secs = f32::NAN;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.tone.duration_secs = 1e7;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { ref field, .. }) if field == "tone.duration_secs"
        ));

        let mut settings = Settings::default();
        settings.tone.duration_secs = MAX_DURATION_SECS;
        assert!(settings.validate().is_ok());

        let mut settings = Settings::default();
        settings.watch.event_buffer = 0;
        assert!(settings.validate().is_err());

        // Out-of-range volume is clamped later, not rejected.
        let mut settings = Settings::default();
        settings.tone.volume = 4.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        Jail::expect_with(|jail| {
            let mut settings = Settings::default();
            settings.watch.debounce_ms = 999;
            settings.logging.modules.insert("chime".to_string(), "debug".to_string());

            let path = jail.directory().join("out/settings.toml");
            settings.save(&path).unwrap();

            let loaded = Settings::load_from(&path).unwrap();
            assert_eq!(loaded.watch.debounce_ms, 999);
            assert_eq!(loaded.logging.modules["chime"], "debug");
            Ok(())
        });
    }

    #[test]
    fn test_init_refuses_overwrite() {
        Jail::expect_with(|jail| {
            let dir = jail.directory().to_path_buf();
            let path = Settings::init_config_file(&dir, false).unwrap();
            assert!(path.ends_with(".chime/settings.toml"));
            assert!(Settings::init_config_file(&dir, false).is_err());
            assert!(Settings::init_config_file(&dir, true).is_ok());
            Ok(())
        });
    }
}
