//! Notifiers: what happens when a qualifying event survives debouncing.
//!
//! # Architecture
//!
//! ```text
//! Monitor pipeline
//!   classify -> debounce -> dispatch queue
//!                               |
//!                           Dispatcher
//!                    (console line, then in order)
//!                               |
//!              +----------------+----------------+
//!              |                                 |
//!         ToneNotifier                     CommandNotifier
//!     (sine tone via AudioSink)        (external program per event)
//! ```

pub mod command;
mod dispatcher;
pub mod tone;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::watcher::NotificationRequest;

pub use command::CommandNotifier;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use tone::{AudioSink, BellSink, ToneNotifier, ToneSpec};

/// Failure of a single notifier invocation. Never fatal.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Playback failed: {reason}")]
    Playback { reason: String },

    #[error("Command '{program}' failed: {reason}")]
    Command { program: String, reason: String },

    #[error("Notifier '{notifier}' timed out after {after:?}")]
    Timeout { notifier: String, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Something that reacts to a notification request.
///
/// Implementations may block for the length of their effect (a tone has
/// real duration); blocking work belongs in `spawn_blocking`.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier name for logging.
    fn name(&self) -> &str;

    /// React to one request.
    async fn notify(&self, req: &NotificationRequest) -> Result<(), NotifyError>;
}
