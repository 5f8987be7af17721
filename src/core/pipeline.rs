//! Pipeline topology: which steps each model runs and how they chain

use crate::core::{
    config::TOPOLOGY_KEY,
    document::{describe, lookup, ConfigDocument},
    error::{ConfigError, ConfigResult},
    step::{StepConfig, StepKind},
};
use serde_yaml::Value;
use std::collections::HashSet;

/// Fallback project name when the configuration declares none
pub const DEFAULT_PROJECT_NAME: &str = "mlpipeline";

/// Steps of one model, in build order
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTopology {
    /// Model key under `models`
    pub name: String,

    /// Explicit position among models, if configured
    pub order: Option<i64>,

    /// Step list, built sequentially
    pub steps: Vec<StepConfig>,
}

/// The topology section of a configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineTopology {
    /// Pipeline name, if configured
    pub pipeline_name: Option<String>,

    /// Models in assembly order
    pub models: Vec<ModelTopology>,

    /// Chain expressions such as `"A >> B >> C"`
    pub dependencies: Vec<String>,
}

impl PipelineTopology {
    /// Read the topology of a merged configuration
    ///
    /// Falls back to the default single-model topology when the configuration
    /// has no topology section but names a model under `models.modelName`.
    pub fn from_document(conf: &ConfigDocument) -> ConfigResult<Self> {
        if let Some(section) = conf.get(TOPOLOGY_KEY) {
            return Self::from_section(section);
        }

        match conf.get_str("models.modelName") {
            Some(model_name) => Ok(Self::default_for(conf, model_name)),
            None => Err(ConfigError::InvalidValue {
                path: TOPOLOGY_KEY.to_string(),
                reason: "no topology section and no models.modelName to derive one from"
                    .to_string(),
            }),
        }
    }

    /// Parse a topology section value
    pub fn from_section(section: &Value) -> ConfigResult<Self> {
        let pipeline_name = lookup(section, "pipelineName")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut models = Vec::new();
        if let Some(entries) = lookup(section, "models") {
            let entries = entries.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
                path: format!("{}.models", TOPOLOGY_KEY),
                reason: format!("expected a mapping, found {}", describe(entries)),
            })?;
            for (key, entry) in entries {
                let name = key
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:?}", key));
                models.push(parse_model(name, entry)?);
            }
        }

        // stable: unordered models keep document order after the ordered ones
        models.sort_by_key(|model| (model.order.is_none(), model.order.unwrap_or_default()));

        let dependencies = ConfigDocument::new(section.clone()).get_string_list("dependencies")
            .map_err(|err| match err {
                ConfigError::InvalidValue { reason, .. } => ConfigError::InvalidValue {
                    path: format!("{}.dependencies", TOPOLOGY_KEY),
                    reason,
                },
                other => other,
            })?;

        Ok(Self {
            pipeline_name,
            models,
            dependencies,
        })
    }

    /// Default single-model topology running all six step kinds in sequence
    pub fn default_for(conf: &ConfigDocument, model_name: &str) -> Self {
        let abbr = model_name.replace("model", "");
        let name = |suffix: &str| format!("{}-{}", abbr, suffix);

        let steps = vec![
            StepConfig::new(name("Preprocessing"), StepKind::Processing).with_step_type("preprocess"),
            StepConfig::new(name("Training"), StepKind::Training)
                .with_chain_sources([name("Preprocessing")]),
            StepConfig::new(name("CreateModel"), StepKind::CreateModel),
            StepConfig::new(name("Transform"), StepKind::Transform),
            StepConfig::new(name("Metrics"), StepKind::Metrics),
            StepConfig::new(name("Register"), StepKind::RegisterModel),
        ];
        let chain = steps
            .iter()
            .map(|step| step.step_name.as_str())
            .collect::<Vec<_>>()
            .join(" >> ");

        let pipeline_name = conf
            .get_str(&format!("models.{}.sagemakerPipeline.pipelineName", model_name))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}-pipeline", project_name(conf), abbr));

        Self {
            pipeline_name: Some(pipeline_name),
            models: vec![ModelTopology {
                name: model_name.to_string(),
                order: None,
                steps,
            }],
            dependencies: vec![chain],
        }
    }

    /// Configured pipeline name, or one derived from the project name
    pub fn resolved_name(&self, conf: &ConfigDocument) -> String {
        self.pipeline_name
            .clone()
            .unwrap_or_else(|| format!("{}-pipeline", project_name(conf)))
    }

    /// Find a step by name across all models
    pub fn find_step(&self, step_name: &str) -> Option<(&ModelTopology, &StepConfig)> {
        self.models.iter().find_map(|model| {
            model
                .steps
                .iter()
                .find(|step| step.step_name == step_name)
                .map(|step| (model, step))
        })
    }

    /// All step names, in assembly order
    pub fn step_names(&self) -> Vec<&str> {
        self.models
            .iter()
            .flat_map(|model| model.steps.iter().map(|step| step.step_name.as_str()))
            .collect()
    }

    /// First step name that appears more than once, if any
    pub fn duplicate_step_name(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.step_names().into_iter().find(|name| !seen.insert(*name))
    }

    pub fn step_count(&self) -> usize {
        self.models.iter().map(|model| model.steps.len()).sum()
    }
}

/// Project name from `project_name`, `projectName` or `models.projectName`
pub fn project_name(conf: &ConfigDocument) -> String {
    conf.get_str("project_name")
        .or_else(|| conf.get_str("projectName"))
        .or_else(|| conf.get_str("models.projectName"))
        .unwrap_or(DEFAULT_PROJECT_NAME)
        .to_string()
}

fn parse_model(name: String, entry: &Value) -> ConfigResult<ModelTopology> {
    let invalid = |reason: String| ConfigError::InvalidTopology {
        model: name.clone(),
        reason,
    };

    if !entry.is_mapping() {
        return Err(invalid(format!("expected a mapping, found {}", describe(entry))));
    }

    let order = match lookup(entry, "order") {
        None => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| invalid(format!("order must be an integer, found {}", describe(value))))?,
        ),
    };

    let steps = match lookup(entry, "steps") {
        None => Vec::new(),
        Some(steps) => serde_yaml::from_value::<Vec<StepConfig>>(steps.clone())
            .map_err(|err| invalid(err.to_string()))?,
    };

    for step in &steps {
        if step.step_class == StepKind::Processing && step.step_type.is_none() {
            return Err(invalid(format!(
                "Processing step '{}' must declare a step_type",
                step.step_name
            )));
        }
    }

    Ok(ModelTopology { name, order, steps })
}
