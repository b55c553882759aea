//! CLI module for the opsman tool.
//!
//! This module provides the command-line interface for managing the Ops
//! Manager director.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
