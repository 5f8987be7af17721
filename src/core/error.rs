//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, merging or interpreting configuration.
///
/// All of them are fatal: they abort before any step is built.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse a YAML document.
    #[error("Failed to parse YAML file at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// The fragment glob pattern could not be compiled.
    #[error("Invalid fragment pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    /// Failed to walk the directory tree while discovering fragments.
    #[error("Failed to traverse directory {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// A document is missing a section the loader cannot do without.
    #[error("Missing '{section}' section in {path}")]
    MissingSection { path: PathBuf, section: String },

    /// The pipeline topology section of a model is malformed.
    #[error("Invalid topology for model '{model}': {reason}")]
    InvalidTopology { model: String, reason: String },

    /// A value exists but has the wrong shape.
    #[error("Invalid value at '{path}': {reason}")]
    InvalidValue { path: String, reason: String },
}

/// Type alias for Result with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;
