//! Static and chained input resolution

use crate::build::{
    definition::{BuiltStep, ManifestFile},
    error::{BuildError, BuildResult},
};
use crate::core::{
    document::ConfigDocument,
    error::ConfigError,
    s3,
    step::{StepConfig, StepKind},
};
use crate::platform::{DataSource, ProcessingInput, PropertyRef, S3DataType};
use serde_json::{json, Value as JsonValue};
use serde_yaml::Value;

/// Maximum static file inputs per step without manifest mode
///
/// Processing jobs accept ten inputs, two of which carry the job's code.
pub const STATIC_INPUT_LIMIT: usize = 7;

pub const PROCESSING_INPUT_PATH: &str = "/opt/ml/processing/input";
pub const PROCESSING_OUTPUT_PATH: &str = "/opt/ml/processing/output";

/// Channel used when a section declares none
pub const DEFAULT_CHANNEL: &str = "train";

/// A static file declared under `channels.<channel>.dataFiles`
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub channel: String,
    pub source_name: String,
    pub file_name: String,
    /// Fully resolved `s3://` URI
    pub uri: String,
}

/// An upstream step output feeding a chained input
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub source_step: String,
    pub channel: String,
    pub uri: DataSource,
}

/// Channel names of a section, in document order
///
/// `channels` may be a mapping (its keys) or a list of names; without it the
/// section has the single default channel.
pub fn channel_names(section: &ConfigDocument) -> Vec<String> {
    let names: Vec<String> = match section.get("channels") {
        Some(Value::Mapping(channels)) => channels
            .keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect(),
        Some(Value::Sequence(channels)) => channels
            .iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(channel)) => vec![channel.clone()],
        _ => Vec::new(),
    };
    if names.is_empty() {
        vec![DEFAULT_CHANNEL.to_string()]
    } else {
        names
    }
}

/// Configuration of one channel; empty when the channel has none
pub fn channel_section(section: &ConfigDocument, channel: &str) -> ConfigDocument {
    section
        .get_mapping("channels")
        .and_then(|channels| channels.get(channel))
        .cloned()
        .map(ConfigDocument::new)
        .unwrap_or_default()
}

/// Static files declared by every channel of a section
///
/// With `first_only`, each channel contributes its first file only.
pub fn declared_files(
    conf: &ConfigDocument,
    section: &ConfigDocument,
    section_path: &str,
    first_only: bool,
) -> BuildResult<Vec<DataFile>> {
    let mut files = Vec::new();
    let Some(channels) = section.get_mapping("channels") else {
        return Ok(files);
    };

    for (key, channel_value) in channels {
        let Some(channel) = key.as_str() else { continue };
        let channel_doc = ConfigDocument::new(channel_value.clone());
        let Some(entries) = channel_doc.get_sequence("dataFiles") else {
            continue;
        };

        let take = if first_only { 1 } else { entries.len() };
        for entry in entries.iter().take(take) {
            let path = format!("{}.channels.{}.dataFiles", section_path, channel);
            let file_name = entry
                .get("fileName")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::InvalidValue {
                    path: path.clone(),
                    reason: "every data file needs a fileName".to_string(),
                })?;
            let source_name = entry
                .get("sourceName")
                .and_then(Value::as_str)
                .unwrap_or_default();

            files.push(DataFile {
                channel: channel.to_string(),
                source_name: source_name.to_string(),
                file_name: file_name.to_string(),
                uri: resolve_file_uri(conf, section, &channel_doc, &path, file_name)?,
            });
        }
    }
    Ok(files)
}

/// Bucket for a channel: its own, then the `train` channel's, then the document's
pub fn channel_bucket(
    conf: &ConfigDocument,
    section: &ConfigDocument,
    channel: &ConfigDocument,
) -> Option<String> {
    channel
        .get_str("s3Bucket")
        .or_else(|| channel.get_str("s3BucketName"))
        .or_else(|| section.get_str("channels.train.s3Bucket"))
        .or_else(|| conf.get_str("s3Bucket"))
        .map(str::to_string)
}

/// Key prefix for a channel's files
pub fn channel_prefix(section: &ConfigDocument, channel: &ConfigDocument) -> String {
    channel
        .get_str("s3InputPrefix")
        .or_else(|| channel.get_str("inputBucketPrefix"))
        .or_else(|| channel.get_str("bucket_prefix"))
        .or_else(|| section.get_str("channels.train.s3InputPrefix"))
        .unwrap_or_default()
        .to_string()
}

fn resolve_file_uri(
    conf: &ConfigDocument,
    section: &ConfigDocument,
    channel: &ConfigDocument,
    path: &str,
    file_name: &str,
) -> BuildResult<String> {
    if s3::is_s3_uri(file_name) {
        return Ok(file_name.to_string());
    }
    let bucket = channel_bucket(conf, section, channel).ok_or_else(|| ConfigError::InvalidValue {
        path: path.to_string(),
        reason: format!("no s3Bucket to resolve '{}' against", file_name),
    })?;
    let prefix = channel_prefix(section, channel);
    Ok(s3::join(&bucket, &[prefix.as_str(), file_name]))
}

/// Fail when more static inputs are declared than a step accepts
pub fn check_static_limit(label: &str, step: &str, count: usize, limit: usize) -> BuildResult<()> {
    if count > limit {
        return Err(BuildError::TooManyStaticInputs {
            label: label.to_string(),
            limit,
            count,
            step: step.to_string(),
        });
    }
    Ok(())
}

/// Whether the section batches its static files into a manifest
pub fn manifest_mode(section: &ConfigDocument) -> bool {
    section.get_bool("manifestInput").unwrap_or(false)
}

/// One processing input per static file
pub fn static_processing_inputs(
    files: &[DataFile],
    input_root: &str,
    distribution: &str,
) -> Vec<ProcessingInput> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let name = if file.source_name.is_empty() {
                format!("{}-{}", file.channel, index)
            } else {
                file.source_name.clone()
            };
            ProcessingInput {
                destination: local_path(input_root, &name),
                name,
                source: DataSource::uri(&file.uri),
                s3_data_type: S3DataType::S3Prefix,
                distribution: distribution.to_string(),
            }
        })
        .collect()
}

/// Batch all static files into a single manifest input
///
/// Entries are listed relative to the shared prefix of the `train` channel.
pub fn manifest_input(
    conf: &ConfigDocument,
    section: &ConfigDocument,
    section_path: &str,
    file_name: String,
    files: &[DataFile],
    input_root: &str,
) -> BuildResult<(ManifestFile, ProcessingInput)> {
    let train = channel_section(section, DEFAULT_CHANNEL);
    let bucket = channel_bucket(conf, section, &train).ok_or_else(|| ConfigError::InvalidValue {
        path: section_path.to_string(),
        reason: "manifest input needs an s3Bucket".to_string(),
    })?;
    let prefix = s3::join_dir(&bucket, &[channel_prefix(section, &train).as_str()]);

    let mut entries = vec![json!({ "prefix": prefix })];
    for file in files {
        let relative = file.uri.strip_prefix(&prefix).ok_or_else(|| ConfigError::InvalidValue {
            path: format!("{}.channels.{}.dataFiles", section_path, file.channel),
            reason: format!("manifest entry '{}' is not under {}", file.file_name, prefix),
        })?;
        entries.push(JsonValue::String(relative.to_string()));
    }

    let input = ProcessingInput {
        name: "manifest".to_string(),
        source: DataSource::uri(&file_name),
        destination: local_path(input_root, DEFAULT_CHANNEL),
        s3_data_type: S3DataType::ManifestFile,
        distribution: "FullyReplicated".to_string(),
    };
    let manifest = ManifestFile {
        file_name,
        entries: JsonValue::Array(entries),
    };
    Ok((manifest, input))
}

/// Previously built steps named as chained sources of `spec`
pub fn chain_sources<'a>(spec: &StepConfig, prior: &'a [BuiltStep]) -> BuildResult<Vec<&'a BuiltStep>> {
    spec.chain_input_source_step
        .iter()
        .map(|source_name| {
            let source = prior
                .iter()
                .find(|step| &step.name == source_name)
                .ok_or_else(|| BuildError::ChainSourceNotBuilt {
                    step: spec.step_name.clone(),
                    source_step: source_name.clone(),
                })?;
            if !source.kind.can_chain_from() {
                return Err(BuildError::InvalidChainSource {
                    step: spec.step_name.clone(),
                    source_step: source_name.clone(),
                    kind: source.kind,
                });
            }
            Ok(source)
        })
        .collect()
}

/// Outputs a chained source exposes
///
/// A Processing source exposes one output per channel of its own section; a
/// Training source its model artifacts; a Transform source its output path.
pub fn source_outputs(source: &BuiltStep, conf: &ConfigDocument) -> Vec<ChainOutput> {
    let step_name = source.step.dependency_source_name();
    let output = |channel: &str, uri: PropertyRef| ChainOutput {
        source_step: source.name.clone(),
        channel: channel.to_string(),
        uri: uri.into(),
    };

    match source.kind {
        StepKind::Processing => {
            let section = match &source.section {
                Some(section) => conf.section(&format!("models.{}.{}", source.model, section)),
                None => ConfigDocument::default(),
            };
            channel_names(&section)
                .iter()
                .map(|channel| output(channel, PropertyRef::processing_output(step_name, channel)))
                .collect()
        }
        StepKind::Training => vec![output("model", PropertyRef::model_artifacts(step_name))],
        StepKind::Transform => vec![output("transform", PropertyRef::transform_output(step_name))],
        _ => Vec::new(),
    }
}

/// `root/name` without doubled slashes
pub fn local_path(root: &str, name: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), name.trim_start_matches('/'))
}
