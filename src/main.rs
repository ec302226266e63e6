//! chime binary: parse arguments, load settings, run the command.

use std::process::ExitCode;

use clap::Parser;

use chime::Settings;
use chime::cli::commands::{self, init, tone, watch};
use chime::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(commands::exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // init needs no settings and must work next to a broken file
    if let Commands::Init { force } = cli.command {
        chime::logging::init();
        return init::run_init(force);
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            chime::logging::init();
            return Err(e.into());
        }
    };
    chime::logging::init_with_config(&settings.logging, cli.verbose);

    match cli.command {
        Commands::Watch {
            root,
            debounce_ms,
            kinds,
            all_kinds,
            mute,
        } => {
            let overrides = watch::WatchOverrides {
                root,
                debounce_ms,
                kinds,
                all_kinds,
                mute,
            };
            watch::run_watch(settings, overrides).await?;
            Ok(())
        }
        Commands::Config => init::run_config(&settings),
        Commands::Tone { frequency, volume } => tone::run_tone(&settings, frequency, volume).await,
        // handled before settings are loaded
        Commands::Init { .. } => Ok(()),
    }
}
