//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::watcher::EventKind;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Audible notifications for filesystem changes
#[derive(Parser, Debug)]
#[command(
    name = "chime",
    version = env!("CARGO_PKG_VERSION"),
    about = "Play a tone when files appear in a directory tree",
    long_about = "Watch a directory tree and notify on created or moved files.\n\
                  Settings are read from .chime/settings.toml and CHIME_* variables.",
    styles = clap_cargo_style(),
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "CHIME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory tree until Ctrl+C
    #[command(after_help = "Examples:\n  \
        chime watch ~/Downloads\n  \
        chime watch . --kinds created,deleted --debounce-ms 500\n  \
        chime watch /srv/drop --mute")]
    Watch {
        /// Directory to watch (default: watch.root from settings)
        root: Option<PathBuf>,

        /// Suppression window per path and kind, 0 disables
        #[arg(short, long)]
        debounce_ms: Option<u64>,

        /// Comma-separated kinds: created, deleted, modified, moved
        #[arg(short, long, value_delimiter = ',', conflicts_with = "all_kinds")]
        kinds: Option<Vec<EventKind>>,

        /// Notify on every kind
        #[arg(long)]
        all_kinds: bool,

        /// Print events without playing a tone
        #[arg(long)]
        mute: bool,
    },

    /// Set up .chime/settings.toml in the current directory
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Play the configured tone once
    Tone {
        /// Override frequency in Hz
        #[arg(long)]
        frequency: Option<f32>,

        /// Override volume (0.0 - 1.0)
        #[arg(long)]
        volume: Option<f32>,
    },
}
