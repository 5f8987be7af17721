//! Core configuration model
//!
//! This module loads the layered YAML configuration, substitutes environment
//! variables into it and exposes the pipeline topology it declares.

pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod placeholder;
pub mod s3;
pub mod step;

pub use config::ConfigLoader;
pub use document::ConfigDocument;
pub use error::{ConfigError, ConfigResult};
pub use pipeline::*;
pub use step::*;
