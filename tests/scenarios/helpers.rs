//! Test utility functions for mlpipeline scenarios

use mlpipeline::build::{BuildResult, PipelineAssembler, PipelineDefinition};
use mlpipeline::core::ConfigDocument;
use mlpipeline::platform::{
    MetricsRequest, ModelRequest, PlatformError, PlatformStep, PlatformStepFactory,
    PlatformStepType, ProcessingRequest, RegisterRequest, TrainingRequest, TransformRequest,
};
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;

/// Factory that records every call and returns minimal steps
///
/// Model and register steps are composites with two inner sub-steps, the
/// shape a real platform binding produces when repacking.
#[derive(Default)]
pub struct RecordingFactory {
    calls: Mutex<Vec<(PlatformStepType, String)>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step type, step name)` per call, in call order
    pub fn calls(&self) -> Vec<(PlatformStepType, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step_type: PlatformStepType, step_name: &str) {
        self.calls.lock().unwrap().push((step_type, step_name.to_string()));
    }

    fn composite(&self, step_name: &str, step_type: PlatformStepType, suffix: &str) -> PlatformStep {
        PlatformStep::composite(
            step_name,
            step_type,
            vec![
                PlatformStep::new(format!("{}-RepackModel", step_name), PlatformStepType::Training, json!({})),
                PlatformStep::new(format!("{}-{}", step_name, suffix), step_type, json!({})),
            ],
        )
    }
}

impl PlatformStepFactory for RecordingFactory {
    fn make_processing_step(&self, request: &ProcessingRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::Processing, &request.step_name);
        Ok(PlatformStep::new(
            &request.step_name,
            PlatformStepType::Processing,
            json!({ "inputs": request.inputs.len() }),
        ))
    }

    fn make_training_step(&self, request: &TrainingRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::Training, &request.step_name);
        Ok(PlatformStep::new(
            &request.step_name,
            PlatformStepType::Training,
            json!({ "channels": request.channels.len() }),
        ))
    }

    fn make_model_step(&self, request: &ModelRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::Model, &request.step_name);
        Ok(self.composite(&request.step_name, PlatformStepType::Model, "CreateModel"))
    }

    fn make_transform_step(&self, request: &TransformRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::Transform, &request.step_name);
        Ok(PlatformStep::new(&request.step_name, PlatformStepType::Transform, json!({})))
    }

    fn make_metrics_step(&self, request: &MetricsRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::Processing, &request.processing.step_name);
        Ok(
            PlatformStep::new(
                &request.processing.step_name,
                PlatformStepType::Processing,
                json!({ "inputs": request.processing.inputs.len() }),
            )
                .with_property_file(request.report.clone()),
        )
    }

    fn make_register_step(&self, request: &RegisterRequest) -> Result<PlatformStep, PlatformError> {
        self.record(PlatformStepType::RegisterModel, &request.step_name);
        Ok(self.composite(&request.step_name, PlatformStepType::RegisterModel, "RegisterModel"))
    }
}

/// Merged configuration of a single `demo` model running all six step kinds
pub const DEMO_CONF: &str = r#"
project_name: "acme"
s3Bucket: "acme-data"
sagemakerNetworkSecurity:
  role: "arn:aws:iam::123456789012:role/pipeline"
sagemakerPipeline:
  pipelineName: "demo-pipeline"
  models:
    demo:
      steps:
        - step_name: "demo-Preprocessing"
          step_class: "Processing"
          step_type: "preprocess"
        - step_name: "demo-Training"
          step_class: "Training"
          chain_input_source_step: ["demo-Preprocessing"]
        - step_name: "demo-CreateModel"
          step_class: "CreateModel"
        - step_name: "demo-Transform"
          step_class: "Transform"
        - step_name: "demo-Metrics"
          step_class: "Metrics"
          chain_input_source_step: ["demo-Transform"]
        - step_name: "demo-Register"
          step_class: "RegisterModel"
  dependencies:
    - "demo-Preprocessing >> demo-Training >> demo-CreateModel >> demo-Transform >> demo-Metrics >> demo-Register"
models:
  demo:
    source_directory: "s3://acme-code/demo"
    preprocess:
      image_uri: "123456789012.dkr.ecr.us-east-1.amazonaws.com/preprocess:latest"
      entry_point: "steps/preprocess.py"
      channels:
        train:
          s3InputPrefix: "raw"
          dataFiles:
            - { sourceName: "features", fileName: "features.csv" }
    train:
      image_uri: "123456789012.dkr.ecr.us-east-1.amazonaws.com/train:latest"
      entry_point: "train.py"
      hyperparams:
        num_leaves: 31
    registry:
      InferenceSpecification:
        image_uri: "123456789012.dkr.ecr.us-east-1.amazonaws.com/inference:latest"
        supported_content_types: ["text/csv"]
        supported_response_MIME_types: ["text/csv"]
    transform:
      channels:
        test:
          inputBucketPrefix: "scoring"
          dataFiles:
            - { fileName: "scoring.csv" }
    evaluate:
      image_uri: "123456789012.dkr.ecr.us-east-1.amazonaws.com/evaluate:latest"
      entry_point: "evaluate.py"
      channels:
        test:
          bucket_prefix: "metrics"
"#;

pub fn demo_conf() -> ConfigDocument {
    ConfigDocument::from_yaml(DEMO_CONF).unwrap()
}

/// Channels `train`, `part1`, `part2`.. each declaring two data files
///
/// Only the first file of each channel (`part-<n>.csv`) is a static input.
fn channels_yaml(channel_count: usize) -> String {
    (0..channel_count)
        .map(|index| {
            let name = if index == 0 { "train".to_string() } else { format!("part{index}") };
            format!(
                "        {name}:\n          s3InputPrefix: \"raw\"\n          dataFiles:\n            - {{ sourceName: \"part{index}\", fileName: \"part-{index}.csv\" }}\n            - {{ sourceName: \"extra{index}\", fileName: \"extra-{index}.csv\" }}\n"
            )
        })
        .collect()
}

/// A single Processing step over `channel_count` channels
pub fn processing_conf(channel_count: usize, manifest: bool) -> ConfigDocument {
    let yaml = format!(
        r#"
s3Bucket: "acme-data"
sagemakerPipeline:
  models:
    demo:
      steps:
        - step_name: "demo-Preprocessing"
          step_class: "Processing"
          step_type: "preprocess"
models:
  demo:
    preprocess:
      manifestInput: {manifest}
      channels:
{channels}"#,
        channels = channels_yaml(channel_count)
    );
    ConfigDocument::from_yaml(&yaml).unwrap()
}

/// A Metrics step whose `evaluate` section declares `channel_count` channels
///
/// The prerequisite Training, CreateModel and Transform steps come first.
pub fn metrics_conf(channel_count: usize, manifest: bool) -> ConfigDocument {
    let yaml = format!(
        r#"
s3Bucket: "acme-data"
sagemakerPipeline:
  models:
    demo:
      steps:
        - {{ step_name: "demo-Training", step_class: "Training" }}
        - {{ step_name: "demo-CreateModel", step_class: "CreateModel" }}
        - {{ step_name: "demo-Transform", step_class: "Transform" }}
        - {{ step_name: "demo-Metrics", step_class: "Metrics" }}
models:
  demo:
    transform:
      channels:
        test:
          dataFiles: [{{ fileName: "scoring.csv" }}]
    evaluate:
      manifestInput: {manifest}
      channels:
{channels}"#,
        channels = channels_yaml(channel_count)
    );
    ConfigDocument::from_yaml(&yaml).unwrap()
}

/// Assemble `conf` with a recording factory and no code-location fallback
pub fn assemble_recorded(conf: &ConfigDocument) -> (BuildResult<PipelineDefinition>, Vec<(PlatformStepType, String)>) {
    let factory = RecordingFactory::new();
    let result = PipelineAssembler::new(&factory)
        .with_source_dir_fallback(None)
        .assemble(conf);
    (result, factory.calls())
}

/// Write `content` at `relative` under `root`, creating directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
