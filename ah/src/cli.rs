//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// askhuman - let AI agents ask a human through a shared markdown file
#[derive(Parser)]
#[command(
    name = "ah",
    about = "MCP server that lets AI agents ask a human and wait for the answer",
    version,
    after_help = "With no subcommand, serves MCP over stdio. Logs are written under the user data dir."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Path to the shared markdown file
    #[arg(long, global = true)]
    pub file: Option<PathBuf>,

    /// Question timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum pending questions
    #[arg(long = "max-pending", global = true)]
    pub max_pending: Option<usize>,

    /// Maximum question length in bytes
    #[arg(long = "max-question-length", global = true)]
    pub max_question_length: Option<usize>,

    /// Maximum context length in bytes
    #[arg(long = "max-context-length", global = true)]
    pub max_context_length: Option<usize>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Serve MCP over stdio (the default when no subcommand is given)
    Serve,

    /// Create the ask file with its instructional header
    Init,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(file) = &self.file {
            config.artifact.file = file.clone();
        }
        if let Some(timeout) = self.timeout {
            config.wait.timeout_secs = timeout;
        }
        if let Some(max_pending) = self.max_pending {
            config.limits.max_pending = max_pending;
        }
        if let Some(max_question_length) = self.max_question_length {
            config.limits.max_question_length = max_question_length;
        }
        if let Some(max_context_length) = self.max_context_length {
            config.limits.max_context_length = max_context_length;
        }
    }
}
