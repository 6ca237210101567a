//! Command-line interface for debate_forge.
//!
//! Provides the `run` command that drives a full debate from the terminal.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
