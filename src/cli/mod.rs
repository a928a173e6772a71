//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, BatchArgs, Command, ConfigAction, PairArgs};
pub use commands::{handle_config_action, run_batch, run_pair, run_probe, CommandResult};
