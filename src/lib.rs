//! mlpipeline - assemble managed ML pipeline definitions from layered YAML configuration

pub mod build;
pub mod cli;
pub mod core;
pub mod persistence;
pub mod platform;

// Re-export commonly used types
pub use build::{
    AssemblyEvent, BuildError, BuildResult, DependencyEdge, DependencyResolver, PipelineAssembler,
    PipelineDefinition, StepBuilder,
};
pub use core::{ConfigDocument, ConfigError, ConfigLoader, PipelineTopology, StepConfig, StepKind};
pub use platform::{DefinitionStepFactory, PlatformError, PlatformStep, PlatformStepFactory};
