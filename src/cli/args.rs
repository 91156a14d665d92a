//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Tether file pointer CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Print engine diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: tether.toml, searched upward)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve targets once and print their state
    #[command(visible_alias = "s")]
    Status {
        #[command(flatten)]
        targets: TargetArgs,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Pin targets and report validity changes as files move around
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        targets: TargetArgs,
    },
}

/// Targets to pin, in addition to `[watch].urls`.
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// URLs (`file:///a/b.txt`) or local paths, relative to the current directory
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}
