//! Test: Prerequisites - step kinds that need an earlier step of the same model

use crate::helpers::*;
use mlpipeline::build::BuildError;
use mlpipeline::core::{ConfigDocument, StepKind};

fn conf_with_steps(steps: &str) -> ConfigDocument {
    let yaml = format!(
        r#"
s3Bucket: "acme-data"
sagemakerPipeline:
  models:
{steps}
models:
  demo:
    transform:
      channels:
        test:
          dataFiles: [{{ fileName: "scoring.csv" }}]
  other:
    transform:
      channels:
        test:
          dataFiles: [{{ fileName: "scoring.csv" }}]
"#
    );
    ConfigDocument::from_yaml(&yaml).unwrap()
}

#[test]
fn test_transform_before_create_model() {
    let conf = conf_with_steps(
        r#"    demo:
      steps:
        - { step_name: "demo-Training", step_class: "Training" }
        - { step_name: "demo-Transform", step_class: "Transform" }
        - { step_name: "demo-CreateModel", step_class: "CreateModel" }"#,
    );

    let (result, calls) = assemble_recorded(&conf);
    match result.unwrap_err() {
        BuildError::MissingPrerequisiteStep {
            kind,
            required,
            step,
            model,
        } => {
            assert_eq!(kind, StepKind::Transform);
            assert_eq!(required, StepKind::CreateModel);
            assert_eq!(step, "demo-Transform");
            assert_eq!(model, "demo");
        }
        other => panic!("unexpected error: {other}"),
    }
    // nothing after the failing step is built
    assert_eq!(calls.len(), 1);
}

#[test]
fn test_create_model_without_training() {
    let conf = conf_with_steps(
        r#"    demo:
      steps:
        - { step_name: "demo-CreateModel", step_class: "CreateModel" }"#,
    );
    let err = assemble_recorded(&conf).0.unwrap_err();
    assert!(err
        .to_string()
        .starts_with("CreateModel step requires a prior Training step"));
}

#[test]
fn test_metrics_without_transform() {
    let conf = conf_with_steps(
        r#"    demo:
      steps:
        - { step_name: "demo-Training", step_class: "Training" }
        - { step_name: "demo-Metrics", step_class: "Metrics" }"#,
    );
    let err = assemble_recorded(&conf).0.unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Metrics step requires a prior Transform step"));
}

#[test]
fn test_register_needs_training_but_not_metrics() {
    let missing = conf_with_steps(
        r#"    demo:
      steps:
        - { step_name: "demo-Register", step_class: "RegisterModel" }"#,
    );
    assert!(matches!(
        assemble_recorded(&missing).0.unwrap_err(),
        BuildError::MissingPrerequisiteStep {
            required: StepKind::Training,
            ..
        }
    ));

    let present = conf_with_steps(
        r#"    demo:
      steps:
        - { step_name: "demo-Training", step_class: "Training" }
        - { step_name: "demo-Register", step_class: "RegisterModel" }"#,
    );
    assert!(assemble_recorded(&present).0.is_ok());
}

/// Prerequisites are tracked per model: another model's steps do not count
#[test]
fn test_prerequisites_do_not_cross_models() {
    let conf = conf_with_steps(
        r#"    other:
      steps:
        - { step_name: "other-Training", step_class: "Training" }
        - { step_name: "other-CreateModel", step_class: "CreateModel" }
    demo:
      steps:
        - { step_name: "demo-Transform", step_class: "Transform" }"#,
    );
    let err = assemble_recorded(&conf).0.unwrap_err();
    assert!(matches!(
        err,
        BuildError::MissingPrerequisiteStep { ref model, .. } if model == "demo"
    ));
}
