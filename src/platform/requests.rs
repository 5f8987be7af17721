//! Requests handed to a [`PlatformStepFactory`](super::PlatformStepFactory)
//!
//! A request carries everything resolved from configuration for one step:
//! job settings with their defaults applied, network settings, and the
//! inputs and outputs already wired to static files or upstream steps.

use crate::core::document::ConfigDocument;
use crate::platform::step::{CacheConfig, DataSource, PropertyFile};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Network and security settings shared by every job
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkSettings {
    pub role: Option<String>,
    pub kms_key: Option<String>,
    pub subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub enable_network_isolation: bool,
    pub encrypt_inter_container_traffic: bool,
}

impl NetworkSettings {
    /// Read `sagemakerNetworkSecurity` from the merged configuration
    pub fn from_config(conf: &ConfigDocument) -> Self {
        Self {
            role: conf
                .get_str("sagemakerNetworkSecurity.role")
                .map(str::to_string),
            kms_key: conf
                .get_str("sagemakerNetworkSecurity.kms_key")
                .map(str::to_string),
            subnets: comma_list(conf.get_str("sagemakerNetworkSecurity.subnets")),
            security_group_ids: comma_list(
                conf.get_str("sagemakerNetworkSecurity.security_groups_id"),
            ),
            enable_network_isolation: false,
            encrypt_inter_container_traffic: true,
        }
    }

    pub fn has_vpc(&self) -> bool {
        !self.subnets.is_empty() || !self.security_group_ids.is_empty()
    }
}

/// Compute settings of a processing or training job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub image_uri: Option<String>,
    pub entry_point: Option<String>,
    pub base_job_name: String,
    pub instance_count: u64,
    pub instance_type: String,
    pub volume_size_in_gb: u64,
    pub max_runtime_seconds: u64,
    pub source_directory: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub tags: Vec<(String, String)>,
}

/// Defaults applied where a section leaves a job setting out
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub base_job_name: &'static str,
    pub volume_size_in_gb: u64,
    pub max_runtime_seconds: u64,
}

impl JobDefaults {
    pub const PROCESSING: JobDefaults = JobDefaults {
        base_job_name: "default-processing-job-name",
        volume_size_in_gb: 32,
        max_runtime_seconds: 3000,
    };

    pub const TRAINING: JobDefaults = JobDefaults {
        base_job_name: "default-training-job-name",
        volume_size_in_gb: 32,
        max_runtime_seconds: 3000,
    };

    pub const METRICS: JobDefaults = JobDefaults {
        base_job_name: "default-model-metrics-job-name",
        volume_size_in_gb: 50,
        max_runtime_seconds: 3600,
    };
}

pub const DEFAULT_INSTANCE_TYPE: &str = "ml.m5.2xlarge";

impl JobSettings {
    /// Read job settings from a model section such as `models.demo.train`
    pub fn from_section(
        section: &ConfigDocument,
        defaults: JobDefaults,
        source_directory: Option<String>,
    ) -> Self {
        Self {
            image_uri: section.get_str("image_uri").map(str::to_string),
            entry_point: section.get_str("entry_point").map(str::to_string),
            base_job_name: section.get_string_or("base_job_name", defaults.base_job_name),
            instance_count: section.get_u64_or("instance_count", 1),
            instance_type: section.get_string_or("instance_type", DEFAULT_INSTANCE_TYPE),
            volume_size_in_gb: section.get_u64_or("volume_size_in_gb", defaults.volume_size_in_gb),
            max_runtime_seconds: section
                .get_u64("max_runtime_seconds")
                .or_else(|| section.get_u64("max_runtime_in_seconds"))
                .unwrap_or(defaults.max_runtime_seconds),
            source_directory,
            environment: string_map(section.get("env")),
            tags: tag_list(section.get("tags")),
        }
    }
}

/// How an S3 input is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3DataType {
    S3Prefix,
    ManifestFile,
}

impl S3DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            S3DataType::S3Prefix => "S3Prefix",
            S3DataType::ManifestFile => "ManifestFile",
        }
    }
}

/// One input of a processing job
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingInput {
    pub name: String,
    pub source: DataSource,
    pub destination: String,
    pub s3_data_type: S3DataType,
    pub distribution: String,
}

/// One output of a processing job
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutput {
    pub name: String,
    pub source: String,
    /// Destination URI; the platform chooses one when absent
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub step_name: String,
    pub model: String,
    pub job: JobSettings,
    pub network: NetworkSettings,
    pub framework_version: String,
    pub inputs: Vec<ProcessingInput>,
    pub outputs: Vec<ProcessingOutput>,
    pub cache: Option<CacheConfig>,
}

/// A metrics step is a processing job that publishes an evaluation report
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRequest {
    pub processing: ProcessingRequest,
    pub report: PropertyFile,
}

/// One named input channel of a training job
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingChannel {
    pub name: String,
    pub source: DataSource,
    pub content_type: Option<String>,
    pub input_mode: String,
    pub distribution: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRequest {
    pub step_name: String,
    pub model: String,
    pub job: JobSettings,
    pub network: NetworkSettings,
    pub output_path: Option<String>,
    pub hyperparameters: BTreeMap<String, String>,
    pub model_data_uri: Option<String>,
    pub channels: Vec<TrainingChannel>,
    pub cache: Option<CacheConfig>,
}

/// Deployable model built from a training step's artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub step_name: String,
    pub model: String,
    pub model_name: Option<String>,
    pub image_uri: Option<String>,
    pub model_data: DataSource,
    /// Repack the artifacts together with the inference code before creating the model
    pub repack: bool,
    pub source_directory: Option<String>,
    pub entry_point: String,
    pub environment: BTreeMap<String, String>,
    pub network: NetworkSettings,
    pub instance_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformSettings {
    pub base_job_name: String,
    pub instance_count: u64,
    pub instance_type: String,
    pub strategy: Option<String>,
    pub assemble_with: Option<String>,
    pub join_source: Option<String>,
    pub split_type: Option<String>,
    pub content_type: String,
    pub max_payload: Option<u64>,
    pub volume_size: u64,
    pub max_runtime_in_seconds: u64,
    pub input_filter: Option<String>,
    pub output_filter: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub tags: Vec<(String, String)>,
}

impl TransformSettings {
    pub fn from_section(section: &ConfigDocument) -> Self {
        let optional = |key: &str| section.get_str(key).map(str::to_string);
        Self {
            base_job_name: section.get_string_or("base_job_name", "default-transform-job-name"),
            instance_count: section.get_u64_or("instance_count", 1),
            instance_type: section.get_string_or("instance_type", DEFAULT_INSTANCE_TYPE),
            strategy: optional("strategy"),
            assemble_with: optional("assemble_with"),
            join_source: optional("join_source"),
            split_type: optional("split_type"),
            content_type: section.get_string_or("content_type", "text/csv"),
            max_payload: section.get_u64("max_payload"),
            volume_size: section.get_u64_or("volume_size", 50),
            max_runtime_in_seconds: section.get_u64_or("max_runtime_in_seconds", 3600),
            input_filter: optional("input_filter"),
            output_filter: optional("output_filter"),
            environment: string_map(section.get("env")),
            tags: tag_list(section.get("tags")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub step_name: String,
    pub model: String,
    pub model_name: DataSource,
    pub settings: TransformSettings,
    pub network: NetworkSettings,
    pub input: Option<DataSource>,
    pub output_path: Option<String>,
    pub cache: Option<CacheConfig>,
}

/// Evaluation report attached to a registered model package
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetricsSource {
    pub content_type: String,
    pub s3_uri: DataSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub step_name: String,
    pub model: String,
    pub model_request: ModelRequest,
    pub package_group: String,
    pub description: String,
    pub content_types: Vec<String>,
    pub response_types: Vec<String>,
    pub inference_instances: Vec<String>,
    pub transform_instances: Vec<String>,
    pub approval_status: String,
    pub model_metrics: Option<ModelMetricsSource>,
}

fn comma_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Scalar to string, for maps the platform expects as strings only
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Mapping of scalars to a sorted string map; anything else is ignored
pub fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_mapping)
        .map(|mapping| {
            mapping
                .iter()
                .filter_map(|(key, value)| Some((key.as_str()?.to_string(), scalar_string(value)?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Tags as either a `Key`/`Value` list or a plain mapping
pub fn tag_list(value: Option<&Value>) -> Vec<(String, String)> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| {
                let key = scalar_string(item.get("Key")?)?;
                let value = scalar_string(item.get("Value")?)?;
                Some((key, value))
            })
            .collect(),
        Some(mapping @ Value::Mapping(_)) => string_map(Some(mapping)).into_iter().collect(),
        _ => Vec::new(),
    }
}
