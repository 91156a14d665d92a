//! Command-line interface module.

mod args;
pub mod common;
pub mod status;
pub mod watch;

pub use args::{Cli, Commands, TargetArgs};
