//! Tether - pin files and follow them across renames, moves and deletes.

mod cli;
mod state;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use tether::config::Config;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    state::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    tether::logger::set_verbose(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    if let Some(path) = &config.config_path {
        tether::debug!("config"; "loaded {}", path.display());
    }

    match &cli.command {
        Commands::Status { targets, json } => {
            cli::status::run_status(&config, &targets.targets, *json)
        }
        Commands::Watch { targets } => cli::watch::run_watch(&config, &targets.targets),
    }
}
