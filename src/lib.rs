//! Audible notifications for filesystem changes.
//!
//! A [`Monitor`] watches a directory tree, keeps the event kinds you care
//! about, suppresses bursts for the same path, and hands each surviving
//! event to a list of [`Notifier`]s: by default a short sine tone.
//!
//! ```no_run
//! use chime::{Monitor, WatchConfig};
//! use chime::notifier::{ToneNotifier, ToneSpec, tone::default_sink};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), chime::WatchError> {
//! let mut monitor = Monitor::builder()
//!     .config(WatchConfig::new("/srv/inbox"))
//!     .notifier(ToneNotifier::new(ToneSpec::default(), default_sink()))
//!     .build()?;
//!
//! let shutdown = CancellationToken::new();
//! monitor.watch(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod logging;
pub mod notifier;
pub mod watcher;

pub use config::Settings;
pub use notifier::{Dispatcher, Notifier, NotifyError};
pub use watcher::{
    ConfigError, EventKind, KindSet, Monitor, MonitorBuilder, MonitorState, MonitorStats,
    NotificationRequest, RawEvent, WatchConfig, WatchError,
};
