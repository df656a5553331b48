//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::context::Action;

/// Runway - multi-tool infrastructure-deployment orchestrator.
#[derive(Parser, Debug)]
#[command(name = "runway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "RUNWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Explicit deploy-environment name, overriding detection.
    #[arg(short = 'e', long, global = true)]
    pub deploy_environment: Option<String>,

    /// Force non-interactive (CI) behavior.
    #[arg(long, global = true)]
    pub ci: bool,

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
    /// Deploy every in-scope deployment in order.
    Deploy {
        /// Only include modules carrying every given tag.
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Destroy every in-scope deployment, in reverse order.
    Destroy {
        /// Only include modules carrying every given tag.
        #[arg(long)]
        tag: Vec<String>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show what a deploy would change, without changing it.
    Plan {
        /// Only include modules carrying every given tag.
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Run per-tool initialization for every in-scope module.
    Init {
        /// Only include modules carrying every given tag.
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Scaffold a starter configuration file.
    New {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Maps the subcommand to an orchestration action, when it is one.
    #[must_use]
    pub const fn action(&self) -> Option<Action> {
        match self {
            Self::Deploy { .. } => Some(Action::Deploy),
            Self::Destroy { .. } => Some(Action::Destroy),
            Self::Plan { .. } => Some(Action::Plan),
            Self::Init { .. } => Some(Action::Init),
            Self::New { .. } => None,
        }
    }

    /// Returns the tag filter of an action subcommand.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        match self {
            Self::Deploy { tag } | Self::Destroy { tag, .. } | Self::Plan { tag } | Self::Init { tag } => {
                tag.clone()
            }
            Self::New { .. } => Vec::new(),
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
