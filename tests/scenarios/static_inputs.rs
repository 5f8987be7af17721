//! Test: Static inputs - the per-step cap and manifest mode
//!
//! Each channel contributes its first data file, so the cap counts channels.

use crate::helpers::*;
use mlpipeline::build::{BuildError, PipelineAssembler};
use mlpipeline::core::StepKind;
use mlpipeline::platform::PlatformStepType;
use mlpipeline::platform::DefinitionStepFactory;
use serde_json::json;

#[test]
fn test_seven_static_inputs_are_accepted() {
    let definition = assemble_recorded(&processing_conf(7, false)).0.unwrap();
    let step = &definition.step("demo-Preprocessing").unwrap().step;
    assert_eq!(step.arguments["inputs"], 7);
}

#[test]
fn test_eight_static_inputs_are_rejected() {
    let err = assemble_recorded(&processing_conf(8, false)).0.unwrap_err();
    match &err {
        BuildError::TooManyStaticInputs {
            label,
            limit,
            count,
            step,
        } => {
            assert_eq!(label, "processing");
            assert_eq!(*limit, 7);
            assert_eq!(*count, 8);
            assert_eq!(step, "demo-Preprocessing");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err
        .to_string()
        .starts_with("Static inputs for processing should not exceed 7"));
}

#[test]
fn test_manifest_mode_batches_many_files() {
    let definition = assemble_recorded(&processing_conf(12, true)).0.unwrap();
    let built = definition.step("demo-Preprocessing").unwrap();

    // one manifest input instead of twelve file inputs
    assert_eq!(built.step.arguments["inputs"], 1);
    assert_eq!(built.manifests.len(), 1);

    let manifest = &built.manifests[0];
    assert_eq!(manifest.file_name, "demo_preprocess_input.manifest");
    let entries = manifest.entries.as_array().unwrap();
    assert_eq!(entries.len(), 13);
    assert_eq!(entries[0], json!({ "prefix": "s3://acme-data/raw/" }));
    assert_eq!(entries[1], "part-0.csv");
    assert!(!entries.contains(&json!("extra-0.csv")));
}

#[test]
fn test_only_the_first_file_of_a_channel_is_an_input() {
    let definition = assemble_recorded(&processing_conf(1, false)).0.unwrap();
    assert_eq!(definition.step("demo-Preprocessing").unwrap().step.arguments["inputs"], 1);
}

#[test]
fn test_seven_static_metrics_inputs_pass_the_cap() {
    // the cap admits seven; the evaluation channel rule then applies
    match assemble_recorded(&metrics_conf(7, false)).0.unwrap_err() {
        BuildError::AmbiguousChannel { step, channels } => {
            assert_eq!(step, "demo-Metrics");
            assert_eq!(channels.len(), 7);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_eight_static_metrics_inputs_are_rejected() {
    let (result, calls) = assemble_recorded(&metrics_conf(8, false));
    let err = result.unwrap_err();
    match &err {
        BuildError::TooManyStaticInputs {
            label, count, step, ..
        } => {
            assert_eq!(label, "metrics");
            assert_eq!(*count, 8);
            assert_eq!(step, "demo-Metrics");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err
        .to_string()
        .starts_with("Static inputs for metrics should not exceed 7"));
    // the metrics step never reaches the factory
    assert_eq!(calls.len(), 3);
}

#[test]
fn test_single_channel_metrics_step_builds() {
    let definition = assemble_recorded(&metrics_conf(1, false)).0.unwrap();
    let metrics = definition.step("demo-Metrics").unwrap();

    assert_eq!(metrics.kind, StepKind::Metrics);
    assert_eq!(metrics.step.step_type, PlatformStepType::Processing);
    assert_eq!(metrics.step.arguments["inputs"], 1);
    assert!(metrics.manifests.is_empty());
}

#[test]
fn test_metrics_manifest_mode() {
    let definition = assemble_recorded(&metrics_conf(1, true)).0.unwrap();
    let metrics = definition.step("demo-Metrics").unwrap();

    assert_eq!(metrics.step.arguments["inputs"], 1);
    assert_eq!(metrics.manifests.len(), 1);
    assert_eq!(metrics.manifests[0].file_name, "demo_evaluate_input.manifest");
    assert_eq!(
        metrics.manifests[0].entries,
        json!([{ "prefix": "s3://acme-data/raw/" }, "part-0.csv"])
    );

    // manifest mode lifts the cap; the evaluation channel rule still holds
    assert!(matches!(
        assemble_recorded(&metrics_conf(9, true)).0.unwrap_err(),
        BuildError::AmbiguousChannel { .. }
    ));
}

#[test]
fn test_manifest_input_rendering() {
    let mut conf = processing_conf(9, true).root().clone();
    let preprocess = conf["models"]["demo"]["preprocess"].as_mapping_mut().unwrap();
    preprocess.insert("image_uri".into(), "preprocess:latest".into());
    preprocess.insert("entry_point".into(), "preprocess.py".into());
    let conf = mlpipeline::core::ConfigDocument::new(conf);

    let factory = DefinitionStepFactory::new();
    let definition = PipelineAssembler::new(&factory)
        .with_source_dir_fallback(None)
        .assemble(&conf)
        .unwrap();

    let input = &definition.step("demo-Preprocessing").unwrap().step.arguments["ProcessingInputs"][0];
    assert_eq!(input["InputName"], "manifest");
    assert_eq!(input["S3Input"]["S3DataType"], "ManifestFile");
    assert_eq!(input["S3Input"]["LocalPath"], "/opt/ml/processing/input/train");
}
