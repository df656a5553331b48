//! Command-line interface.
//!
//! This module contains the CLI argument definitions and output
//! formatting.

pub mod commands;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
