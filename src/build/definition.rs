//! Built steps and the assembled pipeline definition

use crate::build::resolver::DependencyEdge;
use crate::core::step::StepKind;
use crate::platform::{DataSource, PlatformStep};
use serde_json::{json, Value};

/// Version of the pipeline-definition schema the platform expects
pub const DEFINITION_VERSION: &str = "2020-12-01";

/// A manifest batching many static input files into one input
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    /// File name the manifest is written under, next to the definition
    pub file_name: String,

    /// `[{"prefix": "s3://bucket/prefix/"}, "file-1", "file-2", ...]`
    pub entries: Value,
}

/// One step produced by the step builder
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStep {
    /// Declared step name
    pub name: String,

    pub kind: StepKind,

    /// Model the step belongs to
    pub model: String,

    /// Configuration section the step was built from
    pub section: Option<String>,

    /// The platform's view of the step
    pub step: PlatformStep,

    pub manifests: Vec<ManifestFile>,

    /// Location of the evaluation report, for metrics steps
    pub evaluation_report: Option<DataSource>,
}

impl BuiltStep {
    pub fn new(
        name: impl Into<String>,
        kind: StepKind,
        model: impl Into<String>,
        step: PlatformStep,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            section: None,
            step,
            manifests: Vec::new(),
            evaluation_report: None,
        }
    }

    /// Steps this one runs after
    pub fn depends_on(&self) -> &[String] {
        if self.step.is_composite() {
            &self.step.inner[0].depends_on
        } else {
            &self.step.depends_on
        }
    }
}

/// The terminal artifact of assembly
///
/// Steps appear in build order: models in configuration order, and each
/// model's steps in the order its step list declares them.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    pub name: String,
    pub steps: Vec<BuiltStep>,
    pub edges: Vec<DependencyEdge>,
}

impl PipelineDefinition {
    pub fn step(&self, name: &str) -> Option<&BuiltStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Distinct models, in build order
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !models.contains(&step.model.as_str()) {
                models.push(&step.model);
            }
        }
        models
    }

    pub fn manifests(&self) -> impl Iterator<Item = &ManifestFile> {
        self.steps.iter().flat_map(|step| step.manifests.iter())
    }

    /// Steps that neither depend on nor are depended on by another step
    pub fn orphans(&self) -> Vec<&str> {
        if self.steps.len() < 2 {
            return Vec::new();
        }
        self.steps
            .iter()
            .filter(|step| {
                !self
                    .edges
                    .iter()
                    .any(|edge| edge.source == step.name || edge.destination == step.name)
            })
            .map(|step| step.name.as_str())
            .collect()
    }

    /// Render in the platform's pipeline-definition schema
    ///
    /// Composite steps are flattened into their inner sub-steps.
    pub fn to_document(&self) -> Value {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .flat_map(|built| built.step.flatten())
            .map(PlatformStep::to_definition)
            .collect();

        json!({
            "Version": DEFINITION_VERSION,
            "Metadata": {},
            "Parameters": [],
            "Steps": steps,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_document())
    }
}
