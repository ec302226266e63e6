//! Init and Config commands.

use anyhow::{Context, bail};

use crate::config::Settings;

/// Run init command - create `.chime/settings.toml` in the current directory.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;

    match Settings::init_config_file(&cwd, force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(())
        }
        Err(e) => bail!("{e}"),
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Error displaying config")?;
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{toml_str}");
    Ok(())
}
