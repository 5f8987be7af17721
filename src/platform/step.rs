//! Platform step values produced by a [`PlatformStepFactory`](super::PlatformStepFactory)

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

/// Expiry used for every cached step
pub const CACHE_EXPIRY: &str = "10d";

/// Step types of the platform's pipeline-definition schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlatformStepType {
    Processing,
    Training,
    Model,
    Transform,
    RegisterModel,
}

impl PlatformStepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStepType::Processing => "Processing",
            PlatformStepType::Training => "Training",
            PlatformStepType::Model => "Model",
            PlatformStepType::Transform => "Transform",
            PlatformStepType::RegisterModel => "RegisterModel",
        }
    }
}

impl fmt::Display for PlatformStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a property of another step, resolved by the platform at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    pub step_name: String,
    pub path: String,
}

impl PropertyRef {
    pub fn new(step_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            path: path.into(),
        }
    }

    /// S3 URI of a named processing output
    pub fn processing_output(step_name: &str, output_name: &str) -> Self {
        Self::new(
            step_name,
            format!("ProcessingOutputConfig.Outputs['{}'].S3Output.S3Uri", output_name),
        )
    }

    /// S3 URI of a training job's model artifacts
    pub fn model_artifacts(step_name: &str) -> Self {
        Self::new(step_name, "ModelArtifacts.S3ModelArtifacts")
    }

    /// S3 prefix a batch transform writes to
    pub fn transform_output(step_name: &str) -> Self {
        Self::new(step_name, "TransformOutput.S3OutputPath")
    }

    /// Name of a created model
    pub fn model_name(step_name: &str) -> Self {
        Self::new(step_name, "ModelName")
    }

    pub fn expression(&self) -> String {
        format!("Steps.{}.{}", self.step_name, self.path)
    }
}

impl Serialize for PropertyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        json!({ "Get": self.expression() }).serialize(serializer)
    }
}

/// A data location: a literal URI, a step property, or a join of both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Uri(String),
    Property(PropertyRef),
    Join { on: String, values: Vec<DataSource> },
}

impl DataSource {
    pub fn uri(uri: impl Into<String>) -> Self {
        DataSource::Uri(uri.into())
    }

    /// Append a path suffix; an empty suffix leaves the source unchanged
    pub fn join_path(self, suffix: &str) -> Self {
        if suffix.trim_matches('/').is_empty() {
            return self;
        }
        DataSource::Join {
            on: "/".to_string(),
            values: vec![self, DataSource::Uri(suffix.to_string())],
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            DataSource::Uri(uri) => Value::String(uri.clone()),
            DataSource::Property(property) => json!({ "Get": property.expression() }),
            DataSource::Join { on, values } => json!({
                "Std:Join": {
                    "On": on,
                    "Values": values.iter().map(DataSource::to_json).collect::<Vec<_>>(),
                }
            }),
        }
    }
}

impl From<PropertyRef> for DataSource {
    fn from(property: PropertyRef) -> Self {
        DataSource::Property(property)
    }
}

impl Serialize for DataSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheConfig {
    pub enabled: bool,
    pub expire_after: String,
}

impl CacheConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            expire_after: CACHE_EXPIRY.to_string(),
        }
    }
}

/// A JSON file written by a processing step that later steps can query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyFile {
    #[serde(rename = "PropertyFileName")]
    pub name: String,
    #[serde(rename = "OutputName")]
    pub output_name: String,
    #[serde(rename = "FilePath")]
    pub path: String,
}

/// A step as the platform sees it
///
/// Composite steps (model creation, registration) wrap ordered inner
/// sub-steps and render as those sub-steps only.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformStep {
    pub name: String,
    pub step_type: PlatformStepType,
    pub arguments: Value,
    pub depends_on: Vec<String>,
    pub cache_config: Option<CacheConfig>,
    pub property_files: Vec<PropertyFile>,
    pub inner: Vec<PlatformStep>,
}

impl PlatformStep {
    pub fn new(name: impl Into<String>, step_type: PlatformStepType, arguments: Value) -> Self {
        Self {
            name: name.into(),
            step_type,
            arguments,
            depends_on: Vec::new(),
            cache_config: None,
            property_files: Vec::new(),
            inner: Vec::new(),
        }
    }

    /// Wrap ordered sub-steps under one logical step
    pub fn composite(
        name: impl Into<String>,
        step_type: PlatformStepType,
        inner: Vec<PlatformStep>,
    ) -> Self {
        Self {
            inner,
            ..Self::new(name, step_type, Value::Null)
        }
    }

    pub fn with_cache(mut self, cache_config: Option<CacheConfig>) -> Self {
        self.cache_config = cache_config;
        self
    }

    pub fn with_property_file(mut self, property_file: PropertyFile) -> Self {
        self.property_files.push(property_file);
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.inner.is_empty()
    }

    /// Record that this step runs after `step_name`
    pub fn add_depends_on(&mut self, step_name: &str) {
        if !self.depends_on.iter().any(|name| name == step_name) {
            self.depends_on.push(step_name.to_string());
        }
    }

    /// The step a new dependency attaches to: the first inner sub-step of a composite
    pub fn dependency_target_mut(&mut self) -> &mut PlatformStep {
        if self.inner.is_empty() {
            self
        } else {
            &mut self.inner[0]
        }
    }

    /// The name other steps depend on: the last inner sub-step of a composite
    pub fn dependency_source_name(&self) -> &str {
        self.inner
            .last()
            .map(|step| step.name.as_str())
            .unwrap_or(&self.name)
    }

    /// First inner sub-step of the given type, or the step itself if it matches
    pub fn find(&self, step_type: PlatformStepType) -> Option<&PlatformStep> {
        if self.inner.is_empty() {
            return (self.step_type == step_type).then_some(self);
        }
        self.inner.iter().find(|step| step.step_type == step_type)
    }

    /// Steps as they appear in the definition
    pub fn flatten(&self) -> Vec<&PlatformStep> {
        if self.inner.is_empty() {
            vec![self]
        } else {
            self.inner.iter().flat_map(PlatformStep::flatten).collect()
        }
    }

    /// Render one non-composite step in the definition schema
    pub fn to_definition(&self) -> Value {
        let mut step = Map::new();
        step.insert("Name".to_string(), Value::String(self.name.clone()));
        step.insert("Type".to_string(), Value::String(self.step_type.as_str().to_string()));
        step.insert("Arguments".to_string(), self.arguments.clone());
        if !self.depends_on.is_empty() {
            step.insert("DependsOn".to_string(), json!(self.depends_on));
        }
        if let Some(cache_config) = &self.cache_config {
            step.insert("CacheConfig".to_string(), json!(cache_config));
        }
        if !self.property_files.is_empty() {
            step.insert("PropertyFiles".to_string(), json!(self.property_files));
        }
        Value::Object(step)
    }
}
