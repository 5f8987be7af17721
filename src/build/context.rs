//! Per-model record of the step kinds built so far

use crate::build::error::{BuildError, BuildResult};
use crate::core::step::{StepConfig, StepKind};
use std::collections::HashMap;

/// Tracks, for one model, the most recent step built of each kind
///
/// Later steps look their prerequisites up here: a CreateModel step needs
/// the model's Training step, a Transform step its CreateModel step, and so on.
#[derive(Debug, Clone, Default)]
pub struct ModelContext {
    model: String,
    latest: HashMap<StepKind, String>,
}

impl ModelContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            latest: HashMap::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Record a built step; a later step of the same kind replaces the earlier one
    pub fn record(&mut self, kind: StepKind, step_name: impl Into<String>) {
        self.latest.insert(kind, step_name.into());
    }

    pub fn latest(&self, kind: StepKind) -> Option<&str> {
        self.latest.get(&kind).map(String::as_str)
    }

    /// Name of the prerequisite step `spec` needs, if its kind has one
    pub fn require(&self, spec: &StepConfig) -> BuildResult<Option<&str>> {
        match spec.step_class.prerequisite() {
            Some(required) => self.require_kind(spec, required).map(Some),
            None => Ok(None),
        }
    }

    /// Name of the latest `required` step, or the error `spec` fails with
    pub fn require_kind(&self, spec: &StepConfig, required: StepKind) -> BuildResult<&str> {
        self.latest(required)
            .ok_or_else(|| BuildError::MissingPrerequisiteStep {
                kind: spec.step_class,
                required,
                step: spec.step_name.clone(),
                model: self.model.clone(),
            })
    }
}
