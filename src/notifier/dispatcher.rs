//! Fans a notification request out to every configured notifier.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::watcher::NotificationRequest;

use super::Notifier;

type ConsoleFn = dyn Fn(&NotificationRequest) + Send + Sync;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
    /// Notifiers not started because shutdown was requested.
    pub skipped: usize,
}

/// Invokes notifiers in order, isolating failures.
///
/// The notifier list is fixed once the dispatcher is built.
pub struct Dispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
    console: Arc<ConsoleFn>,
}

impl Dispatcher {
    /// Dispatcher writing its console line to stdout.
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            notifiers,
            console: Arc::new(|req: &NotificationRequest| println!("{req}")),
        }
    }

    /// Replace where the per-event console line goes.
    pub fn with_console(
        mut self,
        console: impl Fn(&NotificationRequest) + Send + Sync + 'static,
    ) -> Self {
        self.console = Arc::new(console);
        self
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Announce `req` on the console, then run every notifier in order.
    ///
    /// A failing notifier is logged and the rest still run. Once `stop` is
    /// cancelled no further notifier is started.
    pub async fn dispatch(
        &self,
        req: &NotificationRequest,
        stop: &CancellationToken,
    ) -> DispatchReport {
        (self.console)(req);
        crate::debug_event!("dispatch", "event", "{req}");

        let mut report = DispatchReport::default();
        for (index, notifier) in self.notifiers.iter().enumerate() {
            if stop.is_cancelled() {
                report.skipped = self.notifiers.len() - index;
                crate::debug_event!("dispatch", "cancelled", "skipping {} notifiers", report.skipped);
                break;
            }
            report.invoked += 1;
            if let Err(e) = notifier.notify(req).await {
                report.failed += 1;
                tracing::warn!("[{}] notification failed: {e}", notifier.name());
            }
        }
        report
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("notifiers", &self.notifier_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifyError;
    use crate::watcher::{EventKind, RawEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recording {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn notify(&self, req: &NotificationRequest) -> Result<(), NotifyError> {
            self.log.lock().push(format!("{}:{}", self.name, req.path.display()));
            if self.fail {
                Err(NotifyError::Other("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn request(path: &str) -> NotificationRequest {
        NotificationRequest::from(&RawEvent::new(EventKind::Created, path))
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_notifiers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(vec![
            Box::new(Recording { name: "a", fail: true, log: log.clone() }),
            Box::new(Recording { name: "b", fail: false, log: log.clone() }),
        ])
        .with_console(|_| {});

        let stop = CancellationToken::new();
        let report = dispatcher.dispatch(&request("/w/1"), &stop).await;
        assert_eq!(report, DispatchReport { invoked: 2, failed: 1, skipped: 0 });

        // Subsequent events still flow.
        dispatcher.dispatch(&request("/w/2"), &stop).await;
        assert_eq!(*log.lock(), vec!["a:/w/1", "b:/w/1", "a:/w/2", "b:/w/2"]);
    }

    #[tokio::test]
    async fn test_console_line_precedes_notifiers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let console_log = log.clone();
        let dispatcher = Dispatcher::new(vec![Box::new(Recording {
            name: "a",
            fail: true,
            log: log.clone(),
        })])
        .with_console(move |req| console_log.lock().push(format!("console:{req}")));

        dispatcher.dispatch(&request("/w/x"), &CancellationToken::new()).await;
        assert_eq!(*log.lock(), vec!["console:created /w/x", "a:/w/x"]);
    }

    #[tokio::test]
    async fn test_no_notifiers_still_prints() {
        let lines = Arc::new(Mutex::new(0usize));
        let counter = lines.clone();
        let dispatcher = Dispatcher::new(Vec::new()).with_console(move |_| *counter.lock() += 1);

        let report = dispatcher
            .dispatch(&request("/w/x"), &CancellationToken::new())
            .await;
        assert_eq!(report, DispatchReport::default());
        assert_eq!(*lines.lock(), 1);
        assert!(dispatcher.is_empty());
    }

    /// Cancels the shared token while it runs.
    struct Cancelling {
        stop: CancellationToken,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for Cancelling {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn notify(&self, req: &NotificationRequest) -> Result<(), NotifyError> {
            self.log.lock().push(format!("cancelling:{}", req.path.display()));
            self.stop.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_dispatch_skips_remaining_notifiers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop = CancellationToken::new();
        let dispatcher = Dispatcher::new(vec![
            Box::new(Cancelling { stop: stop.clone(), log: log.clone() }),
            Box::new(Recording { name: "b", fail: false, log: log.clone() }),
            Box::new(Recording { name: "c", fail: false, log: log.clone() }),
        ])
        .with_console(|_| {});

        let report = dispatcher.dispatch(&request("/w/a"), &stop).await;
        assert_eq!(report, DispatchReport { invoked: 1, failed: 0, skipped: 2 });
        assert_eq!(*log.lock(), vec!["cancelling:/w/a"]);
    }
}
