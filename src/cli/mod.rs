//! Command-line interface for swe-crew.
//!
//! Provides the `run`, `fetch` and `evaluate` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
