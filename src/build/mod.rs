//! Step building and pipeline assembly

pub mod assembler;
pub mod builder;
pub mod context;
pub mod definition;
pub mod error;
pub mod inputs;
pub mod resolver;

pub use assembler::{AssemblyEvent, AssemblyEventHandler, PipelineAssembler};
pub use builder::StepBuilder;
pub use context::ModelContext;
pub use definition::{BuiltStep, ManifestFile, PipelineDefinition};
pub use error::{BuildError, BuildResult};
pub use resolver::{DependencyEdge, DependencyResolver};
