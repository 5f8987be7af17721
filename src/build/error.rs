//! Error types for step building and pipeline assembly.

use crate::core::{error::ConfigError, step::StepKind};
use crate::platform::PlatformError;
use thiserror::Error;

/// Errors that abort pipeline assembly.
///
/// None of them is retried and no partial pipeline is ever produced.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A step kind's required predecessor has not been built for the model.
    #[error("{kind} step requires a prior {required} step (step '{step}', model '{model}')")]
    MissingPrerequisiteStep {
        kind: StepKind,
        required: StepKind,
        step: String,
        model: String,
    },

    /// More static file inputs than the platform accepts, without manifest mode.
    #[error("Static inputs for {label} should not exceed {limit} (step '{step}' declares {count})")]
    TooManyStaticInputs {
        label: String,
        limit: usize,
        count: usize,
        step: String,
    },

    /// A single-channel step kind was configured with several channels.
    #[error("Only one channel allowed for step '{step}'; found {channels:?}")]
    AmbiguousChannel { step: String, channels: Vec<String> },

    /// A chain expression could not be applied.
    #[error("Failed when adding dependency between steps {source_step} and {destination_step}: {reason}")]
    DependencyWiringFailure {
        source_step: String,
        destination_step: String,
        reason: String,
    },

    /// Two steps share a name.
    #[error("Step name '{0}' is used more than once")]
    DuplicateStepName(String),

    /// A chained input names a step that has not been built yet.
    #[error("Step '{step}' chains input from '{source_step}', which has not been built before it")]
    ChainSourceNotBuilt { step: String, source_step: String },

    /// A chained input names a step whose kind has no chainable output.
    #[error("Step '{step}' cannot chain input from {kind} step '{source_step}'; valid sources are Processing, Training and Transform")]
    InvalidChainSource {
        step: String,
        source_step: String,
        kind: StepKind,
    },

    /// A step kind accepting one chained source was given several.
    #[error("Maximum {limit} chain input allowed for step '{step}'; {count} found")]
    TooManyChainSources {
        step: String,
        limit: usize,
        count: usize,
    },

    /// A step has no configuration section to read from.
    #[error("Step '{step}' of class {kind} must declare a step_type")]
    MissingStepType { step: String, kind: StepKind },

    /// The platform binding rejected a step.
    #[error("Platform rejected step '{step}': {source}")]
    Platform {
        step: String,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Type alias for Result with BuildError.
pub type BuildResult<T> = Result<T, BuildError>;
