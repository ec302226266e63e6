//! Lifecycle controller: owns the watch source and the event pipeline.
//!
//! ```text
//! Idle --start()--> Running --cancel / source error--> Stopping --> Stopped
//! ```
//!
//! While running, two tasks cooperate:
//! - the pipeline task drains the source channel and runs
//!   classify -> debounce, then queues requests without ever blocking;
//! - the dispatcher task drains that queue and invokes the notifiers.
//!
//! Both check the cancellation token first, so no notifier starts after
//! cancellation has been observed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::notifier::{Dispatcher, Notifier};

use super::classifier::classify;
use super::config::WatchConfig;
use super::debouncer::Debouncer;
use super::error::WatchError;
use super::event::{NotificationRequest, RawEvent};
use super::source::{NotifySource, SourceEvent, WatchSource};

/// How often the pipeline asks the source for held-back events.
const SOURCE_POLL: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl MonitorState {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Running => "running",
            MonitorState::Stopping => "stopping",
            MonitorState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Raw events received from the source.
    pub received: usize,
    /// Events whose kind qualified.
    pub qualified: usize,
    /// Qualifying events swallowed by the debouncer.
    pub suppressed: usize,
    /// Requests handed to the dispatcher.
    pub dispatched: usize,
    /// Requests lost to a full queue or discarded at shutdown.
    pub dropped: usize,
    /// Individual notifier invocations that failed.
    pub notifier_failures: usize,
    /// Notifiers not started because shutdown arrived mid-dispatch.
    pub notifier_skipped: usize,
    /// Debounce entries evicted.
    pub evicted: usize,
}

impl MonitorStats {
    fn merge(&mut self, other: MonitorStats) {
        self.received += other.received;
        self.qualified += other.qualified;
        self.suppressed += other.suppressed;
        self.dispatched += other.dispatched;
        self.dropped += other.dropped;
        self.notifier_failures += other.notifier_failures;
        self.notifier_skipped += other.notifier_skipped;
        self.evicted += other.evicted;
    }
}

/// Watches one directory tree and notifies on qualifying events.
pub struct Monitor {
    config: WatchConfig,
    source: Box<dyn WatchSource>,
    dispatcher: Arc<Dispatcher>,
    state: MonitorState,
    /// Canonical root, set by `start`.
    root: Option<PathBuf>,
    event_rx: Option<mpsc::Receiver<SourceEvent>>,
}

impl Monitor {
    /// Create a builder for configuring the monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Canonical root being watched, once started.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn expect_state(&self, expected: MonitorState) -> Result<(), WatchError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WatchError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// `Idle -> Running`: validate the root and start the source.
    ///
    /// An invalid root fails with a config error before the source is
    /// touched; the monitor stays `Idle`.
    pub fn start(&mut self) -> Result<(), WatchError> {
        self.expect_state(MonitorState::Idle)?;

        let root = self.config.validate()?;

        if self.config.qualifying_kinds.is_empty() {
            tracing::warn!("[monitor] no qualifying event kinds configured; nothing will alert");
        }

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        if let Err(e) = self.source.start(&root, self.config.recursive, tx) {
            self.source.stop();
            self.state = MonitorState::Stopped;
            return Err(e);
        }

        crate::log_event!(
            "monitor",
            "watching",
            "{} via {} (kinds: {}, debounce: {}ms, notifiers: [{}])",
            root.display(),
            self.source.name(),
            self.config.qualifying_kinds,
            self.config.debounce_ms,
            self.dispatcher.notifier_names().join(", ")
        );

        self.root = Some(root);
        self.event_rx = Some(rx);
        self.state = MonitorState::Running;
        Ok(())
    }

    /// Run the pipeline until `shutdown` is cancelled or the source fails.
    ///
    /// Always ends in `Stopped` with the source released. In-flight
    /// notifiers get `shutdown_grace` to finish.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<MonitorStats, WatchError> {
        self.expect_state(MonitorState::Running)?;
        let mut events = self.event_rx.take().ok_or(WatchError::SourceClosed)?;

        let stop = shutdown.child_token();
        let (queue_tx, queue_rx) = mpsc::channel(self.config.dispatch_queue.max(1));
        let mut worker = tokio::spawn(dispatch_worker(
            self.dispatcher.clone(),
            queue_rx,
            stop.clone(),
        ));

        let mut stats = MonitorStats::default();
        let outcome = run_pipeline(
            &self.config,
            self.source.as_mut(),
            &mut events,
            &queue_tx,
            &stop,
            &mut stats,
        )
        .await;

        // Stopping: no new events, no new notifier invocations.
        self.state = MonitorState::Stopping;
        stop.cancel();
        self.source.stop();
        drop(queue_tx);
        drop(events);

        let grace = self.config.shutdown_grace;
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(worker_stats)) => stats.merge(worker_stats),
            Ok(Err(e)) => tracing::error!("[monitor] dispatcher task failed: {e}"),
            Err(_) => {
                tracing::warn!("[monitor] notifiers still running after {grace:?}, abandoning them");
                worker.abort();
            }
        }

        self.state = MonitorState::Stopped;
        crate::log_event!(
            "monitor",
            "stopped",
            "{} received, {} dispatched, {} suppressed, {} dropped, {} notifier failures",
            stats.received,
            stats.dispatched,
            stats.suppressed,
            stats.dropped,
            stats.notifier_failures
        );

        outcome.map(|()| stats)
    }

    /// `start` followed by `run`.
    pub async fn watch(&mut self, shutdown: CancellationToken) -> Result<MonitorStats, WatchError> {
        self.start()?;
        self.run(shutdown).await
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("source", &self.source.name())
            .field("dispatcher", &self.dispatcher)
            .field("state", &self.state)
            .finish()
    }
}

/// Classify and debounce until cancelled or the source fails.
async fn run_pipeline(
    config: &WatchConfig,
    source: &mut dyn WatchSource,
    events: &mut mpsc::Receiver<SourceEvent>,
    queue: &mpsc::Sender<NotificationRequest>,
    stop: &CancellationToken,
    stats: &mut MonitorStats,
) -> Result<(), WatchError> {
    let mut debouncer = Debouncer::new(config.debounce_ms);
    let max_age = eviction_age(config);
    let mut source_poll = tokio::time::interval(SOURCE_POLL);
    source_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut eviction = if config.debounce_ms > 0 && !config.eviction_interval.is_zero() {
        Some(tokio::time::interval(config.eviction_interval))
    } else {
        None
    };

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                crate::debug_event!("monitor", "cancellation observed");
                return Ok(());
            }

            item = events.recv() => match item {
                Some(Ok(raw)) => handle_raw(raw, config, &mut debouncer, queue, stats),
                Some(Err(e)) => {
                    tracing::error!("[monitor] watch source failed: {e}");
                    return Err(e);
                }
                None => return Err(WatchError::SourceClosed),
            },

            _ = source_poll.tick() => {
                for raw in source.expire(Instant::now()) {
                    handle_raw(raw, config, &mut debouncer, queue, stats);
                }
            }

            _ = next_tick(&mut eviction) => {
                let evicted = debouncer.evict_stale(Instant::now(), max_age);
                if evicted > 0 {
                    crate::debug_event!("debounce", "evicted", "{evicted} entries");
                }
                stats.evicted += evicted;
            }
        }
    }
}

/// Age after which a debounce entry is evicted. Saturates instead of
/// overflowing for huge windows.
fn eviction_age(config: &WatchConfig) -> Duration {
    config
        .debounce_window()
        .checked_mul(config.eviction_factor.max(1))
        .unwrap_or(Duration::MAX)
}

fn handle_raw(
    raw: RawEvent,
    config: &WatchConfig,
    debouncer: &mut Debouncer,
    queue: &mpsc::Sender<NotificationRequest>,
    stats: &mut MonitorStats,
) {
    stats.received += 1;

    let Some(req) = classify(&raw, config) else {
        crate::debug_event!("monitor", "ignored", "{} {}", raw.kind, raw.path.display());
        return;
    };
    stats.qualified += 1;

    if !debouncer.should_dispatch(&req) {
        stats.suppressed += 1;
        crate::debug_event!("debounce", "suppressed", "{req}");
        return;
    }

    match queue.try_send(req) {
        Ok(()) => {}
        Err(TrySendError::Full(req)) => {
            stats.dropped += 1;
            tracing::warn!("[monitor] notification queue full, dropping: {req}");
        }
        Err(TrySendError::Closed(req)) => {
            stats.dropped += 1;
            crate::debug_event!("monitor", "dispatcher gone", "{req}");
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drains the dispatch queue until cancelled.
async fn dispatch_worker(
    dispatcher: Arc<Dispatcher>,
    mut queue: mpsc::Receiver<NotificationRequest>,
    stop: CancellationToken,
) -> MonitorStats {
    let mut stats = MonitorStats::default();

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => break,

            req = queue.recv() => match req {
                Some(req) => {
                    let report = dispatcher.dispatch(&req, &stop).await;
                    stats.dispatched += 1;
                    stats.notifier_failures += report.failed;
                    stats.notifier_skipped += report.skipped;
                }
                None => break,
            },
        }
    }

    let pending = queue.len();
    if pending > 0 {
        crate::debug_event!("dispatch", "discarding", "{pending} queued notifications");
        stats.dropped += pending;
    }
    stats
}

/// Builder for constructing a [`Monitor`].
pub struct MonitorBuilder {
    config: Option<WatchConfig>,
    notifiers: Vec<Box<dyn Notifier>>,
    source: Option<Box<dyn WatchSource>>,
    console: Option<Box<dyn Fn(&NotificationRequest) + Send + Sync>>,
}

impl MonitorBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: None,
            notifiers: Vec::new(),
            source: None,
            console: None,
        }
    }

    /// Set the watch configuration.
    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append a notifier. Notifiers run in the order they were added.
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    /// Append an already boxed notifier.
    pub fn boxed_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Use a custom watch source instead of the platform watcher.
    pub fn source(mut self, source: impl WatchSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Redirect the per-event console line.
    pub fn console(mut self, console: impl Fn(&NotificationRequest) + Send + Sync + 'static) -> Self {
        self.console = Some(Box::new(console));
        self
    }

    /// Build the Monitor in the `Idle` state.
    pub fn build(self) -> Result<Monitor, WatchError> {
        let config = self.config.ok_or_else(|| WatchError::InitFailed {
            reason: "Watch config is required".to_string(),
        })?;

        let mut dispatcher = Dispatcher::new(self.notifiers);
        if let Some(console) = self.console {
            dispatcher = dispatcher.with_console(move |req| console(req));
        }

        let source = self.source.unwrap_or_else(|| {
            Box::new(NotifySource::new().with_rename_timeout(config.rename_timeout))
        });

        Ok(Monitor {
            config,
            source,
            dispatcher: Arc::new(dispatcher),
            state: MonitorState::Idle,
            root: None,
            event_rx: None,
        })
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
