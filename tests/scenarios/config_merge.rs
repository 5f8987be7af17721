//! Test: Configuration merge - base document, model fragments and environment

use crate::helpers::*;
use mlpipeline::core::{ConfigError, ConfigLoader, PipelineTopology};

const BASE: &str = r#"
conf:
  modelConfigFilePath: "models/*/conf.yaml"
  project_name: "acme"
  s3Bucket: "DATA_BUCKET"
  models:
    churn:
      source_directory: "s3://acme-code/churn"
      train:
        instance_type: "ml.m5.large"
"#;

const CHURN: &str = r#"
conf:
  models:
    churn:
      train:
        image_uri: "ACCOUNT_ID.dkr.ecr.us-east-1.amazonaws.com/churn:latest"
        entry_point: "train.py"
  sagemakerPipeline:
    pipelineName: "churn-pipeline"
    models:
      churn:
        steps:
          - { step_name: "churn-Training", step_class: "Training" }
      fraud:
        steps:
          - { step_name: "fraud-Training", step_class: "Training" }
    dependencies:
      - "churn-Training >> fraud-Training"
"#;

const FRAUD: &str = r#"
conf:
  models:
    fraud:
      train:
        image_uri: "ACCOUNT_ID.dkr.ecr.us-east-1.amazonaws.com/fraud:latest"
"#;

fn env(name: &str) -> Option<String> {
    match name {
        "DATA_BUCKET" => Some("acme-data".to_string()),
        "ACCOUNT_ID" => Some("123456789012".to_string()),
        _ => None,
    }
}

#[test]
fn test_fragments_merge_into_one_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "framework/conf/conf.yaml", BASE);
    write_file(dir.path(), "models/churn/conf.yaml", CHURN);
    write_file(dir.path(), "models/fraud/conf.yaml", FRAUD);
    write_file(dir.path(), "models/fraud/extra/conf.yaml", "not: [valid");

    let conf = ConfigLoader::new(dir.path(), "framework/conf/conf.yaml")
        .with_env(env)
        .load()
        .unwrap();

    // the base model keeps its keys; the fragment's `train` replaces the base's
    assert_eq!(conf.get_str("models.churn.source_directory"), Some("s3://acme-code/churn"));
    assert_eq!(conf.get_str("models.churn.train.instance_type"), None);
    assert_eq!(
        conf.get_str("models.fraud.train.image_uri"),
        Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/fraud:latest")
    );
    assert_eq!(conf.get_str("s3Bucket"), Some("acme-data"));

    let topology = PipelineTopology::from_document(&conf).unwrap();
    assert_eq!(topology.resolved_name(&conf), "churn-pipeline");

    let definition = assemble_recorded(&conf).0.unwrap();
    assert_eq!(definition.models(), vec!["churn", "fraud"]);
    assert_eq!(
        definition.step("fraud-Training").unwrap().depends_on().to_vec(),
        vec!["churn-Training".to_string()]
    );
}

#[test]
fn test_malformed_fragment_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "framework/conf/conf.yaml", BASE);
    write_file(dir.path(), "models/broken/conf.yaml", "conf: [unclosed");

    let err = ConfigLoader::new(dir.path(), "framework/conf/conf.yaml")
        .with_env(env)
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse { ref path, .. } if path.ends_with("models/broken/conf.yaml")));
}

#[test]
fn test_missing_base_document() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new(dir.path(), "framework/conf/conf.yaml")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}

#[test]
fn test_base_document_without_fragment_pattern() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "framework/conf/conf.yaml",
        "conf:\n  s3Bucket: \"acme-data\"\n",
    );
    write_file(dir.path(), "models/churn/conf.yaml", CHURN);

    let conf = ConfigLoader::new(dir.path(), "framework/conf/conf.yaml")
        .with_env(env)
        .load()
        .unwrap();
    assert!(conf.get("models.churn").is_none());
    assert_eq!(conf.get_string_or("sagemakerPipeline.pipelineName", "none"), "none");
}
