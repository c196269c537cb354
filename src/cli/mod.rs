//! Command-line interface for agent-forge.
//!
//! Provides commands for running the training loop, one-off evaluation,
//! and domain validation.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
