//! Pipeline assembly: every model's steps, then the dependency graph

use crate::build::{
    builder::StepBuilder,
    context::ModelContext,
    definition::{BuiltStep, PipelineDefinition},
    error::{BuildError, BuildResult},
    resolver::DependencyResolver,
};
use crate::core::{document::ConfigDocument, pipeline::PipelineTopology, step::StepKind};
use crate::platform::PlatformStepFactory;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Progress reported while a pipeline is assembled
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyEvent {
    AssemblyStarted {
        assembly_id: Uuid,
        pipeline_name: String,
        model_count: usize,
    },
    ModelStarted {
        model: String,
        step_count: usize,
    },
    StepBuilt {
        model: String,
        step_name: String,
        kind: StepKind,
    },
    DependencyAdded {
        source: String,
        destination: String,
    },
    AssemblyCompleted {
        assembly_id: Uuid,
        pipeline_name: String,
        step_count: usize,
        edge_count: usize,
    },
}

/// Type for event handlers
pub type AssemblyEventHandler = Arc<dyn Fn(AssemblyEvent) + Send + Sync>;

/// Builds the full pipeline definition from a merged configuration
///
/// Models are built sequentially in topology order, each model's steps in
/// declaration order. Chained inputs may reference steps of earlier models.
/// Dependency edges are wired only after every step exists. Any error aborts
/// assembly; no partial definition is returned.
pub struct PipelineAssembler<'a> {
    factory: &'a dyn PlatformStepFactory,
    source_dir_fallback: Option<Option<String>>,
    event_handlers: Vec<AssemblyEventHandler>,
}

impl<'a> PipelineAssembler<'a> {
    pub fn new(factory: &'a dyn PlatformStepFactory) -> Self {
        Self {
            factory,
            source_dir_fallback: None,
            event_handlers: Vec::new(),
        }
    }

    /// Pin the code location used by models without a `source_directory`,
    /// instead of reading it from the environment
    pub fn with_source_dir_fallback(mut self, source_dir: Option<String>) -> Self {
        self.source_dir_fallback = Some(source_dir);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(AssemblyEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: AssemblyEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Read the topology of `conf` and assemble it
    pub fn assemble(&self, conf: &ConfigDocument) -> BuildResult<PipelineDefinition> {
        let topology = PipelineTopology::from_document(conf)?;
        self.assemble_topology(conf, &topology)
    }

    /// Assemble an already-parsed topology
    pub fn assemble_topology(
        &self,
        conf: &ConfigDocument,
        topology: &PipelineTopology,
    ) -> BuildResult<PipelineDefinition> {
        if let Some(name) = topology.duplicate_step_name() {
            return Err(BuildError::DuplicateStepName(name.to_string()));
        }

        let assembly_id = Uuid::new_v4();
        let pipeline_name = topology.resolved_name(conf);
        info!(
            "Assembling pipeline '{}' ({} models, {} steps)",
            pipeline_name,
            topology.models.len(),
            topology.step_count()
        );
        self.emit_event(AssemblyEvent::AssemblyStarted {
            assembly_id,
            pipeline_name: pipeline_name.clone(),
            model_count: topology.models.len(),
        });

        let mut builder = StepBuilder::new(conf, self.factory);
        if let Some(source_dir) = &self.source_dir_fallback {
            builder = builder.with_source_dir_fallback(source_dir.clone());
        }

        let mut steps: Vec<BuiltStep> = Vec::with_capacity(topology.step_count());
        for model in &topology.models {
            self.emit_event(AssemblyEvent::ModelStarted {
                model: model.name.clone(),
                step_count: model.steps.len(),
            });

            let mut context = ModelContext::new(&model.name);
            for spec in &model.steps {
                let built = builder.build(spec, &model.name, &context, &steps)?;
                context.record(built.kind, built.name.clone());

                self.emit_event(AssemblyEvent::StepBuilt {
                    model: model.name.clone(),
                    step_name: built.name.clone(),
                    kind: built.kind,
                });
                steps.push(built);
            }
        }

        let edges = DependencyResolver::resolve(&topology.dependencies, &mut steps)?;
        for edge in &edges {
            self.emit_event(AssemblyEvent::DependencyAdded {
                source: edge.source.clone(),
                destination: edge.destination.clone(),
            });
        }

        let definition = PipelineDefinition {
            name: pipeline_name,
            steps,
            edges,
        };
        for orphan in definition.orphans() {
            debug!("Step '{}' is not part of any dependency chain", orphan);
        }

        info!(
            "Assembled pipeline '{}': {} steps, {} dependencies",
            definition.name,
            definition.steps.len(),
            definition.edges.len()
        );
        self.emit_event(AssemblyEvent::AssemblyCompleted {
            assembly_id,
            pipeline_name: definition.name.clone(),
            step_count: definition.steps.len(),
            edge_count: definition.edges.len(),
        });

        Ok(definition)
    }
}
