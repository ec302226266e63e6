//! Directory watching: from raw filesystem events to notification requests.
//!
//! # Architecture
//!
//! ```text
//! WatchSource (notify thread)
//!   - translates backend events into RawEvent
//!   - bounded channel
//!         |
//! Monitor pipeline task
//!   - classify (qualifying kinds)
//!   - Debouncer (per path + kind)
//!   - bounded dispatch queue
//!         |
//! Dispatcher task -> notifiers
//! ```

mod classifier;
mod config;
mod debouncer;
mod error;
mod event;
mod monitor;
mod source;

pub use classifier::classify;
pub use config::{DEFAULT_DEBOUNCE_MS, DEFAULT_RENAME_TIMEOUT, WatchConfig, validate_root};
pub use debouncer::Debouncer;
pub use error::{ConfigError, WatchError};
pub use event::{EventKind, KindSet, NotificationRequest, RawEvent};
pub use monitor::{Monitor, MonitorBuilder, MonitorState, MonitorStats};
pub use source::{
    ChannelSource, ChannelSourceHandle, EventTranslator, NotifySource, SourceEvent, WatchSource,
};
