//! Persistence layer for pipeline build history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteBuildStore;

use crate::build::PipelineDefinition;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Succeeded => "Succeeded",
            BuildStatus::Failed => "Failed",
        }
    }

    /// Unknown values read back as `Failed`
    pub fn parse(value: &str) -> Self {
        match value {
            "Succeeded" => BuildStatus::Succeeded,
            _ => BuildStatus::Failed,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one pipeline build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Unique build ID
    pub build_id: Uuid,

    /// Pipeline name; the configured base path when assembly failed before naming
    pub pipeline_name: String,

    pub status: BuildStatus,

    pub model_count: usize,
    pub step_count: usize,
    pub edge_count: usize,

    /// Where the definition was written, if it was
    pub definition_path: Option<String>,

    /// Error text of a failed build
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Record of a successful build
    pub fn succeeded(definition: &PipelineDefinition, definition_path: Option<&Path>) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            pipeline_name: definition.name.clone(),
            status: BuildStatus::Succeeded,
            model_count: definition.models().len(),
            step_count: definition.steps.len(),
            edge_count: definition.edges.len(),
            definition_path: definition_path.map(|path| path.display().to_string()),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Record of a failed build
    pub fn failed(pipeline_name: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            status: BuildStatus::Failed,
            model_count: 0,
            step_count: 0,
            edge_count: 0,
            definition_path: None,
            error: Some(error.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a build record
    async fn save_build(&self, record: &BuildRecord) -> Result<()>;

    /// Load a build by ID
    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>>;

    /// List builds of a pipeline, newest first
    async fn list_builds(&self, pipeline_name: &str) -> Result<Vec<BuildRecord>>;

    /// List all pipeline names, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
pub struct InMemoryPersistence {
    builds: RwLock<HashMap<Uuid, BuildRecord>>,
    by_pipeline: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            builds: RwLock::new(HashMap::new()),
            by_pipeline: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_build(&self, record: &BuildRecord) -> Result<()> {
        let mut builds = self.builds.write().await;
        let replaced = builds.insert(record.build_id, record.clone()).is_some();

        if !replaced {
            let mut by_pipeline = self.by_pipeline.write().await;
            by_pipeline
                .entry(record.pipeline_name.clone())
                .or_default()
                .push(record.build_id);
        }

        Ok(())
    }

    async fn load_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>> {
        let builds = self.builds.read().await;
        Ok(builds.get(&build_id).cloned())
    }

    async fn list_builds(&self, pipeline_name: &str) -> Result<Vec<BuildRecord>> {
        let builds = self.builds.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<BuildRecord> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| builds.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        let mut names: Vec<String> = by_pipeline.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
