//! Watch command: run a monitor until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::notifier::tone::default_sink;
use crate::notifier::{CommandNotifier, Notifier, ToneNotifier};
use crate::watcher::{EventKind, Monitor, MonitorStats};

/// CLI overrides for the `watch` command.
#[derive(Debug, Default, Clone)]
pub struct WatchOverrides {
    pub root: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub kinds: Option<Vec<EventKind>>,
    pub all_kinds: bool,
    pub mute: bool,
}

impl WatchOverrides {
    /// Highest-precedence layer on top of file and environment settings.
    pub fn apply(self, settings: &mut Settings) {
        if let Some(root) = self.root {
            // Command-line roots are relative to the working directory.
            settings.watch.root = root;
            settings.base_dir = None;
        }
        if let Some(ms) = self.debounce_ms {
            settings.watch.debounce_ms = ms;
        }
        if self.all_kinds {
            settings.watch.qualifying_kinds = EventKind::ALL.to_vec();
        } else if let Some(kinds) = self.kinds {
            settings.watch.qualifying_kinds = kinds;
        }
        if self.mute {
            settings.tone.enabled = false;
        }
    }
}

/// Notifiers enabled by the settings, in invocation order.
pub fn build_notifiers(settings: &Settings) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    if settings.tone.enabled {
        let tone = ToneNotifier::new(settings.tone.spec(), default_sink())
            .with_cooldown(settings.tone.cooldown());
        notifiers.push(Box::new(tone));
    }
    if let Some(command) = &settings.command {
        notifiers.push(Box::new(CommandNotifier::from_config(command)));
    }

    notifiers
}

/// Run the watch command.
pub async fn run_watch(
    mut settings: Settings,
    overrides: WatchOverrides,
) -> anyhow::Result<MonitorStats> {
    overrides.apply(&mut settings);
    settings.validate()?;

    let mut builder = Monitor::builder().config(settings.watch_config());
    for notifier in build_notifiers(&settings) {
        builder = builder.boxed_notifier(notifier);
    }
    let mut monitor = builder.build()?;

    let ct = CancellationToken::new();
    tokio::spawn(shutdown_signal(ct.clone()));

    let result = monitor.watch(ct.clone()).await;
    // Releases the signal listener when the source failed first.
    ct.cancel();

    Ok(result?)
}

/// Cancel `ct` on Ctrl+C or SIGTERM.
async fn shutdown_signal(ct: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("[watch] cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("[watch] cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = ct.cancelled() => return,
    }

    eprintln!("Shutting down...");
    ct.cancel();
}
