//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// opsman - Declarative Ops Manager director configuration.
#[derive(Parser, Debug)]
#[command(name = "opsman")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "OPSMAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the manifest and director document.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan {
        /// Show property-level differences.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Stage the director configuration and apply changes.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Do not wait for the installation to finish.
        #[arg(long)]
        no_wait: bool,
    },

    /// Read the director and record it in state.
    Refresh,

    /// Adopt an existing director into state.
    Import {
        /// Director ID (the target hostname).
        id: String,
    },

    /// Check for drift between state and Ops Manager.
    Drift,

    /// Forget the director. Ops Manager is left unchanged.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect or manage local state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "opsman", "--output", "json", "apply", "--yes", "--no-wait",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Apply {
                yes: true,
                no_wait: true
            }
        ));
    }

    #[test]
    fn test_parse_import_id() {
        let cli = Cli::try_parse_from(["opsman", "import", "opsman.example.com"]).unwrap();
        match cli.command {
            Commands::Import { id } => assert_eq!(id, "opsman.example.com"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_state_unlock() {
        let cli =
            Cli::try_parse_from(["opsman", "-c", "x.yaml", "state", "unlock", "--force"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Unlock { force: true, .. }
            }
        ));
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
