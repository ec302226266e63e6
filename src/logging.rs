//! Compact timestamped logging with per-module level configuration.
//!
//! Supports `RUST_LOG` for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! chime = "debug"   # show every event the pipeline sees
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug chime watch
//! RUST_LOG=chime::watcher=trace chime watch ~/inbox
//! ```
//!
//! Logs go to stderr; stdout carries only the per-event console lines.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.default.clone();
    for (module, level) in &config.modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect. `verbose` raises the default level to
/// `debug` unless `RUST_LOG` is set.
pub fn init_with_config(config: &LoggingConfig, verbose: bool) {
    INIT.call_once(|| {
        // RUST_LOG env var takes precedence over config
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(filter_directives(config)).unwrap_or_else(|e| {
                eprintln!("Invalid logging configuration ({e}), falling back to 'warn'");
                EnvFilter::new("warn")
            })
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with default configuration (`warn`).
pub fn init() {
    init_with_config(&LoggingConfig::default(), false);
}

/// Log a pipeline event with stage context.
///
/// # Examples
/// ```ignore
/// log_event!("monitor", "watching", "{}", root.display());
/// log_event!("monitor", "stopped");
/// ```
#[macro_export]
macro_rules! log_event {
    ($stage:expr, $event:expr) => {
        tracing::info!("[{}] {}", $stage, $event)
    };
    ($stage:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $stage, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("debounce", "suppressed", "{req}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($stage:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $stage, $event)
    };
    ($stage:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $stage, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), "warn");

        config.modules.insert("chime::notifier".to_string(), "debug".to_string());
        config.modules.insert("notify".to_string(), "error".to_string());
        assert_eq!(
            filter_directives(&config),
            "warn,chime::notifier=debug,notify=error"
        );
        assert!(EnvFilter::try_new(filter_directives(&config)).is_ok());
    }
}
