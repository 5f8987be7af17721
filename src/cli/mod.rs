//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{BuildCommand, HistoryCommand, InspectCommand, ListCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Assemble ML pipeline definitions from layered YAML configuration
#[derive(Debug, Parser, Clone)]
#[command(name = "mlpipeline")]
#[command(version = "0.1.0")]
#[command(about = "Assemble ML pipeline definitions from layered YAML configuration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory configuration paths are resolved against
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Base configuration document, relative to the root
    #[arg(long, global = true, default_value = crate::core::config::DEFAULT_BASE_PATH)]
    pub conf: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Assemble the pipeline and write its definition
    Build(BuildCommand),

    /// Assemble the pipeline without writing anything
    Validate(ValidateCommand),

    /// Print the merged configuration
    Inspect(InspectCommand),

    /// List pipelines in build history
    List(ListCommand),

    /// Show build history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
