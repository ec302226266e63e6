//! Watch sources: where raw events come from.
//!
//! [`NotifySource`] wraps `notify::RecommendedWatcher` (inotify, FSEvents,
//! ReadDirectoryChangesW, ...). [`ChannelSource`] is fed by hand, for tests
//! and for embedders that already have an event stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use notify::event::{EventKind as NotifyKind, ModifyKind, RenameMode};
use notify::{Event, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::config::DEFAULT_RENAME_TIMEOUT;
use super::error::WatchError;
use super::event::{EventKind, RawEvent};

/// Item delivered by a source: an event, or a fatal source failure.
pub type SourceEvent = Result<RawEvent, WatchError>;

/// A producer of raw filesystem events for one root.
pub trait WatchSource: Send {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Begin delivering events for `root` into `events`.
    fn start(
        &mut self,
        root: &Path,
        recursive: bool,
        events: mpsc::Sender<SourceEvent>,
    ) -> Result<(), WatchError>;

    /// Stop delivering events and release OS resources. Idempotent.
    fn stop(&mut self);

    /// Events held back past their deadline, polled by the monitor.
    fn expire(&mut self, _now: Instant) -> Vec<RawEvent> {
        Vec::new()
    }
}

/// Source backed by the platform's recommended `notify` watcher.
pub struct NotifySource {
    watcher: Option<notify::RecommendedWatcher>,
    root: Option<PathBuf>,
    /// Shared with the backend callback thread.
    translator: Arc<Mutex<EventTranslator>>,
}

impl NotifySource {
    pub fn new() -> Self {
        Self {
            watcher: None,
            root: None,
            translator: Arc::new(Mutex::new(EventTranslator::new())),
        }
    }

    /// How long a rename's first half waits for its partner.
    pub fn with_rename_timeout(self, timeout: Duration) -> Self {
        self.translator.lock().timeout = timeout;
        self
    }
}

impl Default for NotifySource {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSource for NotifySource {
    fn name(&self) -> &str {
        "notify"
    }

    fn start(
        &mut self,
        root: &Path,
        recursive: bool,
        events: mpsc::Sender<SourceEvent>,
    ) -> Result<(), WatchError> {
        let translator = self.translator.clone();

        // Runs on notify's own thread, outside the tokio runtime.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let items: Vec<SourceEvent> = match res {
                Ok(event) => translator.lock().translate(event).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(WatchError::EventError {
                    details: e.to_string(),
                })],
            };
            for item in items {
                if events.blocking_send(item).is_err() {
                    // Pipeline is gone; nothing left to deliver to.
                    return;
                }
            }
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        watcher
            .watch(root, mode)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        crate::debug_event!("source", "watching", "{} ({mode:?})", root.display());

        self.watcher = Some(watcher);
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Some(root) = self.root.take() {
                if let Err(e) = watcher.unwatch(&root) {
                    crate::debug_event!("source", "unwatch failed", "{e}");
                }
            }
            // Dropping the watcher closes the inotify fd / FSEvents stream.
            drop(watcher);

            // No notifier may run after shutdown, so unpaired halves are dropped.
            let discarded = self.translator.lock().discard_pending();
            if discarded > 0 {
                crate::debug_event!("source", "discarded", "{discarded} unpaired renames");
            }
            crate::debug_event!("source", "stopped");
        }
    }

    fn expire(&mut self, now: Instant) -> Vec<RawEvent> {
        self.translator.lock().expire(now)
    }
}

impl Drop for NotifySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Converts `notify` events into [`RawEvent`]s.
///
/// Backends report renames differently. inotify sends `From` and `To`
/// halves sharing a tracker cookie followed by a combined `Both`; Windows
/// sends untracked `From`/`To` pairs; FSEvents sends `Any` per path. All of
/// them end up as a single `Moved` event.
///
/// A `From` whose `To` never arrives (the file left the tree) is released
/// as `Moved` without a destination by [`EventTranslator::expire`] once
/// `timeout` has passed, or earlier when an unrelated event arrives.
#[derive(Debug)]
pub struct EventTranslator {
    /// `From` halves waiting for their `To`, keyed by tracker (0 = untracked).
    pending_from: HashMap<usize, (PathBuf, Instant)>,
    /// Trackers already reported, so the trailing `Both` is skipped.
    completed: Vec<usize>,
    timeout: Duration,
}

impl Default for EventTranslator {
    fn default() -> Self {
        Self::new()
    }
}

const UNTRACKED: usize = 0;
const COMPLETED_MEMORY: usize = 64;

impl EventTranslator {
    pub fn new() -> Self {
        Self {
            pending_from: HashMap::new(),
            completed: Vec::new(),
            timeout: DEFAULT_RENAME_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Release `From` halves that waited at least `timeout` as moves out of
    /// the tree.
    pub fn expire(&mut self, now: Instant) -> Vec<RawEvent> {
        let timeout = self.timeout;
        let expired: Vec<usize> = self
            .pending_from
            .iter()
            .filter(|(_, (_, since))| now.saturating_duration_since(*since) >= timeout)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.pending_from.remove(&key))
            .map(|(from, since)| RawEvent::moved(from, None).at(since))
            .collect()
    }

    /// Forget unpaired halves. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let count = self.pending_from.len();
        self.pending_from.clear();
        count
    }

    /// Translate one backend event into zero or more raw events.
    ///
    /// A rename whose destination never shows up inside the tree is
    /// reported as `Moved` without a destination once the next unrelated
    /// event arrives.
    pub fn translate(&mut self, event: Event) -> Vec<RawEvent> {
        if event.need_rescan() {
            tracing::warn!("[source] event queue overflowed, some changes may have been missed");
        }

        let tracker = event.tracker();
        let mut out = Vec::new();

        match event.kind {
            NotifyKind::Modify(ModifyKind::Name(mode)) => {
                self.translate_rename(mode, tracker, event.paths, &mut out);
            }
            kind => {
                self.flush_pending(&mut out);
                let mapped = match kind {
                    NotifyKind::Create(_) => Some(EventKind::Created),
                    NotifyKind::Remove(_) => Some(EventKind::Deleted),
                    NotifyKind::Modify(_) => Some(EventKind::Modified),
                    NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => None,
                };
                if let Some(kind) = mapped {
                    out.extend(event.paths.into_iter().map(|p| RawEvent::new(kind, p)));
                }
            }
        }

        out
    }

    fn translate_rename(
        &mut self,
        mode: RenameMode,
        tracker: Option<usize>,
        mut paths: Vec<PathBuf>,
        out: &mut Vec<RawEvent>,
    ) {
        let key = tracker.unwrap_or(UNTRACKED);

        match mode {
            RenameMode::From => {
                self.flush_pending(out);
                if let Some(path) = paths.pop() {
                    self.pending_from.insert(key, (path, Instant::now()));
                }
            }
            RenameMode::To => {
                let Some(to) = paths.pop() else { return };
                match self.pending_from.remove(&key) {
                    Some((from, _)) => {
                        if tracker.is_some() {
                            self.remember_completed(key);
                        }
                        out.push(RawEvent::moved(from, Some(to)));
                    }
                    None => {
                        // Moved in from outside the tree: only the new name is known.
                        self.flush_pending(out);
                        out.push(RawEvent::moved(to, None));
                    }
                }
            }
            RenameMode::Both => {
                if tracker.is_some() && self.completed.contains(&key) {
                    return;
                }
                self.pending_from.remove(&key);
                self.flush_pending(out);
                if paths.len() >= 2 {
                    let to = paths.pop();
                    let from = paths.swap_remove(0);
                    out.push(RawEvent::moved(from, to));
                } else if let Some(path) = paths.pop() {
                    out.push(RawEvent::moved(path, None));
                }
            }
            RenameMode::Any | RenameMode::Other => {
                self.flush_pending(out);
                out.extend(paths.into_iter().map(|p| RawEvent::moved(p, None)));
            }
        }
    }

    fn flush_pending(&mut self, out: &mut Vec<RawEvent>) {
        for (_, (from, since)) in self.pending_from.drain() {
            out.push(RawEvent::moved(from, None).at(since));
        }
    }

    fn remember_completed(&mut self, tracker: usize) {
        if self.completed.len() >= COMPLETED_MEMORY {
            self.completed.remove(0);
        }
        self.completed.push(tracker);
    }
}

/// Source fed through a [`ChannelSourceHandle`].
pub struct ChannelSource {
    shared: Arc<ChannelShared>,
}

#[derive(Default)]
struct ChannelShared {
    sink: Mutex<Option<mpsc::Sender<SourceEvent>>>,
    starts: AtomicUsize,
    running: AtomicBool,
}

/// Sending side of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelSourceHandle {
    shared: Arc<ChannelShared>,
}

impl ChannelSource {
    pub fn new() -> (Self, ChannelSourceHandle) {
        let shared = Arc::new(ChannelShared::default());
        (
            Self {
                shared: shared.clone(),
            },
            ChannelSourceHandle { shared },
        )
    }
}

impl WatchSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    fn start(
        &mut self,
        _root: &Path,
        _recursive: bool,
        events: mpsc::Sender<SourceEvent>,
    ) -> Result<(), WatchError> {
        *self.shared.sink.lock() = Some(events);
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.sink.lock().take();
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl ChannelSourceHandle {
    /// Deliver an event. Returns false when the source is not running.
    pub async fn send(&self, event: RawEvent) -> bool {
        self.deliver(Ok(event)).await
    }

    /// Report a fatal source failure.
    pub async fn fail(&self, error: WatchError) -> bool {
        self.deliver(Err(error)).await
    }

    async fn deliver(&self, item: SourceEvent) -> bool {
        let sink = self.shared.sink.lock().clone();
        match sink {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        }
    }

    /// Whether the monitor has started and not yet stopped the source.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// How many times the source has been started.
    pub fn start_count(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: NotifyKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    fn rename(mode: RenameMode, tracker: Option<usize>, paths: &[&str]) -> Event {
        let mut event = event(NotifyKind::Modify(ModifyKind::Name(mode)), paths);
        if let Some(t) = tracker {
            event = event.set_tracker(t);
        }
        event
    }

    #[test]
    fn test_basic_kinds() {
        let mut tr = EventTranslator::new();

        let out = tr.translate(event(NotifyKind::Create(CreateKind::File), &["/w/a"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Created);

        let out = tr.translate(event(NotifyKind::Create(CreateKind::Folder), &["/w/d"]));
        assert_eq!(out[0].kind, EventKind::Created);

        let out = tr.translate(event(NotifyKind::Remove(RemoveKind::File), &["/w/a"]));
        assert_eq!(out[0].kind, EventKind::Deleted);

        let out = tr.translate(event(
            NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a"],
        ));
        assert_eq!(out[0].kind, EventKind::Modified);

        let out = tr.translate(event(NotifyKind::Access(notify::event::AccessKind::Any), &["/w/a"]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_inotify_rename_reported_once() {
        let mut tr = EventTranslator::new();

        assert!(tr.translate(rename(RenameMode::From, Some(7), &["/w/a.txt"])).is_empty());

        let out = tr.translate(rename(RenameMode::To, Some(7), &["/w/sub/b.txt"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Moved);
        assert_eq!(out[0].path, PathBuf::from("/w/a.txt"));
        assert_eq!(out[0].dest_path, Some(PathBuf::from("/w/sub/b.txt")));

        let out = tr.translate(rename(RenameMode::Both, Some(7), &["/w/a.txt", "/w/sub/b.txt"]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_both_only_backend() {
        let mut tr = EventTranslator::new();
        let out = tr.translate(rename(RenameMode::Both, None, &["/w/a", "/w/b"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, PathBuf::from("/w/a"));
        assert_eq!(out[0].dest_path, Some(PathBuf::from("/w/b")));
    }

    #[test]
    fn test_untracked_pair() {
        let mut tr = EventTranslator::new();
        assert!(tr.translate(rename(RenameMode::From, None, &["/w/a"])).is_empty());
        let out = tr.translate(rename(RenameMode::To, None, &["/w/b"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dest_path, Some(PathBuf::from("/w/b")));
    }

    #[test]
    fn test_move_out_of_tree_flushed_by_next_event() {
        let mut tr = EventTranslator::new();
        assert!(tr.translate(rename(RenameMode::From, Some(3), &["/w/gone"])).is_empty());

        let out = tr.translate(event(NotifyKind::Create(CreateKind::File), &["/w/new"]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, EventKind::Moved);
        assert_eq!(out[0].path, PathBuf::from("/w/gone"));
        assert_eq!(out[0].dest_path, None);
        assert_eq!(out[1].kind, EventKind::Created);
    }

    #[test]
    fn test_move_out_of_tree_released_after_timeout() {
        let mut tr = EventTranslator::new().with_timeout(Duration::from_millis(200));
        assert!(tr.translate(rename(RenameMode::From, Some(4), &["/w/left"])).is_empty());

        let now = Instant::now();
        assert!(tr.expire(now).is_empty());

        let out = tr.expire(now + Duration::from_millis(250));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Moved);
        assert_eq!(out[0].path, PathBuf::from("/w/left"));
        assert!(out[0].dest_path.is_none());

        // Released exactly once.
        assert!(tr.expire(now + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_paired_rename_never_expires() {
        let mut tr = EventTranslator::new().with_timeout(Duration::ZERO);
        tr.translate(rename(RenameMode::From, Some(5), &["/w/a"]));
        assert_eq!(tr.translate(rename(RenameMode::To, Some(5), &["/w/b"])).len(), 1);
        assert!(tr.expire(Instant::now() + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_discard_pending() {
        let mut tr = EventTranslator::new().with_timeout(Duration::ZERO);
        tr.translate(rename(RenameMode::From, Some(6), &["/w/a"]));
        assert_eq!(tr.discard_pending(), 1);
        assert!(tr.expire(Instant::now()).is_empty());
    }

    #[test]
    fn test_move_into_tree() {
        let mut tr = EventTranslator::new();
        let out = tr.translate(rename(RenameMode::To, Some(9), &["/w/arrived"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Moved);
        assert_eq!(out[0].path, PathBuf::from("/w/arrived"));
        assert!(out[0].dest_path.is_none());
    }

    #[test]
    fn test_fsevents_style_rename() {
        let mut tr = EventTranslator::new();
        let out = tr.translate(rename(RenameMode::Any, None, &["/w/a"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Moved);
    }

    #[tokio::test]
    async fn test_channel_source_lifecycle() {
        let (mut source, handle) = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(4);

        assert!(!handle.send(RawEvent::new(EventKind::Created, "/w/a")).await);

        source.start(Path::new("/w"), true, tx).unwrap();
        assert!(handle.is_running());
        assert_eq!(handle.start_count(), 1);

        assert!(handle.send(RawEvent::new(EventKind::Created, "/w/a")).await);
        let got = rx.recv().await.unwrap().unwrap();
        assert_eq!(got.path, PathBuf::from("/w/a"));

        source.stop();
        assert!(!handle.is_running());
        assert!(!handle.send(RawEvent::new(EventKind::Created, "/w/b")).await);
    }
}
