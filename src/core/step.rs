//! Step kinds and per-step topology configuration

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The closed set of step kinds a pipeline can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(alias = "processing", alias = "preprocessing")]
    Processing,
    #[serde(alias = "training")]
    Training,
    #[serde(alias = "createmodel")]
    CreateModel,
    #[serde(alias = "transform")]
    Transform,
    #[serde(alias = "metrics")]
    Metrics,
    #[serde(alias = "registermodel")]
    RegisterModel,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Processing,
        StepKind::Training,
        StepKind::CreateModel,
        StepKind::Transform,
        StepKind::Metrics,
        StepKind::RegisterModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Processing => "Processing",
            StepKind::Training => "Training",
            StepKind::CreateModel => "CreateModel",
            StepKind::Transform => "Transform",
            StepKind::Metrics => "Metrics",
            StepKind::RegisterModel => "RegisterModel",
        }
    }

    /// Lowercase label used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Processing => "processing",
            StepKind::Training => "training",
            StepKind::CreateModel => "create model",
            StepKind::Transform => "transform",
            StepKind::Metrics => "metrics",
            StepKind::RegisterModel => "register model",
        }
    }

    /// Model configuration section read when the step names no `step_type`
    ///
    /// Processing has no default: its section must be named explicitly.
    pub fn default_section(&self) -> Option<&'static str> {
        match self {
            StepKind::Processing => None,
            StepKind::Training => Some("train"),
            StepKind::CreateModel | StepKind::RegisterModel => Some("registry"),
            StepKind::Transform => Some("transform"),
            StepKind::Metrics => Some("evaluate"),
        }
    }

    /// Step kind that must already be built for the same model
    pub fn prerequisite(&self) -> Option<StepKind> {
        match self {
            StepKind::Processing | StepKind::Training => None,
            StepKind::CreateModel | StepKind::RegisterModel => Some(StepKind::Training),
            StepKind::Transform => Some(StepKind::CreateModel),
            StepKind::Metrics => Some(StepKind::Transform),
        }
    }

    /// Whether the platform step wraps inner sub-steps
    pub fn is_composite(&self) -> bool {
        matches!(self, StepKind::CreateModel | StepKind::RegisterModel)
    }

    /// Whether this kind's output can feed another step's chained input
    pub fn can_chain_from(&self) -> bool {
        matches!(
            self,
            StepKind::Processing | StepKind::Training | StepKind::Transform
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a model's `steps` list in the topology section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique across the whole pipeline
    pub step_name: String,

    /// Step kind
    pub step_class: StepKind,

    /// Model configuration section the step reads (e.g. `preprocess`)
    #[serde(default)]
    pub step_type: Option<String>,

    /// Names of previously built steps whose outputs feed this step
    #[serde(
        default,
        alias = "chain_input_source_steps",
        deserialize_with = "one_or_many"
    )]
    pub chain_input_source_step: Vec<String>,

    /// Extra path appended to a chained Transform input
    #[serde(default)]
    pub chain_input_additional_prefix: Option<String>,

    /// Whether the platform may reuse a previous run of this step
    #[serde(default)]
    pub enable_cache: bool,
}

impl StepConfig {
    pub fn new(step_name: impl Into<String>, step_class: StepKind) -> Self {
        Self {
            step_name: step_name.into(),
            step_class,
            step_type: None,
            chain_input_source_step: Vec::new(),
            chain_input_additional_prefix: None,
            enable_cache: false,
        }
    }

    pub fn with_step_type(mut self, step_type: impl Into<String>) -> Self {
        self.step_type = Some(step_type.into());
        self
    }

    pub fn with_chain_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chain_input_source_step = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Configuration section this step reads, if any
    pub fn section(&self) -> Option<&str> {
        self.step_type
            .as_deref()
            .or_else(|| self.step_class.default_section())
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
