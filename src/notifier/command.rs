//! Runs an external program for each notification.
//!
//! Useful for desktop popups (`notify-send`), webhooks (`curl`) or any
//! script. The event is passed through environment variables:
//! `CHIME_EVENT_KIND`, `CHIME_EVENT_PATH` and `CHIME_EVENT_DEST` (empty when
//! the event has no destination).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::watcher::NotificationRequest;

use super::{Notifier, NotifyError};

/// `[command]` settings section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Spawns `program args...` once per notification.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn command_error(&self, reason: impl Into<String>) -> NotifyError {
        NotifyError::Command {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn name(&self) -> &str {
        "command"
    }

    async fn notify(&self, req: &NotificationRequest) -> Result<(), NotifyError> {
        let dest = req
            .dest_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("CHIME_EVENT_KIND", req.kind.as_str())
            .env("CHIME_EVENT_PATH", &req.path)
            .env("CHIME_EVENT_DEST", dest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.command_error(format!("spawn failed: {e}")))?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    crate::debug_event!("command", "kill failed", "{e}");
                }
                return Err(NotifyError::Timeout {
                    notifier: self.name().to_string(),
                    after: self.timeout,
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(self.command_error(format!("exited with {status}")))
        }
    }
}
