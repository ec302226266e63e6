//! Decides which raw events are worth a notification.

use super::config::WatchConfig;
use super::event::{NotificationRequest, RawEvent};

/// Turn a qualifying raw event into a notification request.
///
/// Directory creation qualifies the same as file creation. `Moved` covers
/// both renames and relocations.
pub fn classify(raw: &RawEvent, config: &WatchConfig) -> Option<NotificationRequest> {
    if config.qualifying_kinds.contains(raw.kind) {
        Some(NotificationRequest::from(raw))
    } else {
        None
    }
}
