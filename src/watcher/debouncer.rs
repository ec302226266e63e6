//! Per-(path, kind) debouncing of notification requests.
//!
//! Editors and archive tools touch the same path many times in quick
//! succession. The first event of a window is let through and the rest are
//! suppressed, so the alert fires promptly rather than after the burst ends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::event::{EventKind, NotificationRequest};

/// Debounces notification requests by `(path, kind)`.
///
/// Owned by the single pipeline task, so no locking is needed.
#[derive(Debug)]
pub struct Debouncer {
    /// Last dispatched timestamp per key.
    last_seen: HashMap<(PathBuf, EventKind), Instant>,
    /// Suppression window. Zero disables debouncing.
    window: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given window in milliseconds.
    pub fn new(window_ms: u64) -> Self {
        Self {
            last_seen: HashMap::new(),
            window: Duration::from_millis(window_ms),
        }
    }

    /// Decide whether `req` should reach the notifiers.
    ///
    /// Records `req.timestamp` only when returning true. A suppressed event
    /// does not extend the window.
    pub fn should_dispatch(&mut self, req: &NotificationRequest) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let key = (req.path.clone(), req.kind);
        match self.last_seen.get(&key) {
            Some(last) if req.timestamp.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.last_seen.insert(key, req.timestamp);
                true
            }
        }
    }

    /// Drop entries whose last dispatch is at least `max_age` before `now`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) < max_age);
        before - self.last_seen.len()
    }

    /// Number of tracked keys.
    pub fn tracked_count(&self) -> usize {
        self.last_seen.len()
    }
}
