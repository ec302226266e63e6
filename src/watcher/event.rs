//! Event records flowing through the watch pipeline.
//!
//! A [`RawEvent`] is what the watch source reports. The classifier turns a
//! qualifying one into a [`NotificationRequest`], which is the only thing
//! notifiers ever see.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Kind of filesystem mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A file or directory appeared.
    Created,
    /// A file or directory was removed.
    Deleted,
    /// File contents or metadata changed.
    Modified,
    /// A file or directory was renamed or relocated.
    Moved,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Deleted,
        EventKind::Modified,
        EventKind::Moved,
    ];

    /// Lowercase name used in config files and console output.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::Modified => "modified",
            EventKind::Moved => "moved",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            EventKind::Created => 0b0001,
            EventKind::Deleted => 0b0010,
            EventKind::Modified => 0b0100,
            EventKind::Moved => 0b1000,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "create" => Ok(EventKind::Created),
            "deleted" | "delete" | "removed" => Ok(EventKind::Deleted),
            "modified" | "modify" => Ok(EventKind::Modified),
            "moved" | "move" | "renamed" | "rename" => Ok(EventKind::Moved),
            other => Err(format!(
                "unknown event kind '{other}' (expected created, deleted, modified or moved)"
            )),
        }
    }
}

/// Set of [`EventKind`]s, stored as a bitmask so membership is O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindSet(u8);

impl KindSet {
    /// Empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// All four kinds.
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// `{Created, Moved}`: deletions and modifications are recognized but
    /// do not alert unless enabled.
    pub const fn default_qualifying() -> Self {
        Self(EventKind::Created.bit() | EventKind::Moved.bit())
    }

    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: EventKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = EventKind> + '_ {
        EventKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<EventKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        let mut set = KindSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(EventKind::as_str).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Event as reported by the watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    /// Destination of a move, when the source could pair both halves.
    pub dest_path: Option<PathBuf>,
    pub timestamp: Instant,
}

impl RawEvent {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            dest_path: None,
            timestamp: Instant::now(),
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: Option<PathBuf>) -> Self {
        Self {
            kind: EventKind::Moved,
            path: from.into(),
            dest_path: to,
            timestamp: Instant::now(),
        }
    }

    /// Override the timestamp (sources that batch events, tests).
    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A qualifying event on its way to the notifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub kind: EventKind,
    pub path: PathBuf,
    pub dest_path: Option<PathBuf>,
    pub timestamp: Instant,
}

impl From<&RawEvent> for NotificationRequest {
    fn from(raw: &RawEvent) -> Self {
        Self {
            kind: raw.kind,
            path: raw.path.clone(),
            dest_path: raw.dest_path.clone(),
            timestamp: raw.timestamp,
        }
    }
}

/// Console form: `created /a/b.txt` or `moved /a/b.txt -> /a/c.txt`.
impl fmt::Display for NotificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())?;
        if let Some(dest) = &self.dest_path {
            write!(f, " -> {}", dest.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!("Created".parse::<EventKind>().unwrap(), EventKind::Created);
        assert_eq!("rename".parse::<EventKind>().unwrap(), EventKind::Moved);
        assert_eq!(" removed ".parse::<EventKind>().unwrap(), EventKind::Deleted);
        assert!("touched".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_kind_set_membership() {
        let set = KindSet::default_qualifying();
        assert!(set.contains(EventKind::Created));
        assert!(set.contains(EventKind::Moved));
        assert!(!set.contains(EventKind::Deleted));
        assert!(!set.contains(EventKind::Modified));
        assert_eq!(set.to_string(), "created,moved");

        let mut set = KindSet::empty();
        assert!(set.is_empty());
        set.insert(EventKind::Modified);
        set.insert(EventKind::Modified);
        assert_eq!(set.iter().count(), 1);
        set.remove(EventKind::Modified);
        assert!(set.is_empty());
    }

    #[test]
    fn test_request_display() {
        let raw = RawEvent::new(EventKind::Created, "/tmp/watched/a.txt");
        let req = NotificationRequest::from(&raw);
        assert_eq!(req.to_string(), "created /tmp/watched/a.txt");

        let raw = RawEvent::moved("/w/a.txt", Some(PathBuf::from("/w/sub/b.txt")));
        let req = NotificationRequest::from(&raw);
        assert_eq!(req.to_string(), "moved /w/a.txt -> /w/sub/b.txt");
    }
}
