//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod tone;
pub mod watch;

use crate::watcher::{ConfigError, WatchError};

/// Exit code for configuration errors (bad root, invalid settings).
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for any other fatal error.
pub const EXIT_FAILURE: u8 = 1;

/// Map a fatal error to the process exit code.
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    let is_config = error.downcast_ref::<ConfigError>().is_some()
        || error
            .downcast_ref::<WatchError>()
            .is_some_and(WatchError::is_config);

    if is_config { EXIT_CONFIG } else { EXIT_FAILURE }
}
