//! Boundary to the managed ML platform
//!
//! Step building never talks to the platform directly. It resolves
//! configuration into requests and hands each one to a
//! [`PlatformStepFactory`], which returns the platform's view of the step.

pub mod definition_factory;
pub mod requests;
pub mod step;

pub use definition_factory::DefinitionStepFactory;
pub use requests::*;
pub use step::{CacheConfig, DataSource, PlatformStep, PlatformStepType, PropertyFile, PropertyRef};

use thiserror::Error;

/// Errors raised by a platform binding while creating a step
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Step '{step}' is missing required argument '{argument}'")]
    MissingArgument { step: String, argument: String },

    #[error("Failed to render step arguments: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Creates platform steps, one method per step kind
pub trait PlatformStepFactory {
    fn make_processing_step(&self, request: &ProcessingRequest) -> Result<PlatformStep, PlatformError>;

    fn make_training_step(&self, request: &TrainingRequest) -> Result<PlatformStep, PlatformError>;

    /// Model creation; may return a composite of a repack and a create sub-step
    fn make_model_step(&self, request: &ModelRequest) -> Result<PlatformStep, PlatformError>;

    fn make_transform_step(&self, request: &TransformRequest) -> Result<PlatformStep, PlatformError>;

    fn make_metrics_step(&self, request: &MetricsRequest) -> Result<PlatformStep, PlatformError>;

    /// Model package registration; may return a composite
    fn make_register_step(&self, request: &RegisterRequest) -> Result<PlatformStep, PlatformError>;
}
