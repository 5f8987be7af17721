//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Assemble the pipeline and write its definition
#[derive(Debug, Args, Clone)]
pub struct BuildCommand {
    /// Where to write the pipeline definition; manifests go next to it
    #[arg(short, long, default_value = "pipeline_definition.json")]
    pub output: PathBuf,

    /// Don't save the build to history
    #[arg(long)]
    pub no_history: bool,
}

/// Assemble the pipeline without writing anything
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Print the definition as JSON
    #[arg(long)]
    pub json: bool,
}

/// Print the merged configuration
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// Dotted path to print instead of the whole document, e.g. `models.demo.train`
    pub path: Option<String>,
}

/// List pipelines in build history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show build counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show build history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent builds to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single build by ID
    #[arg(long)]
    pub build_id: Option<String>,
}
