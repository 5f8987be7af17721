//! Test: End to end - six step kinds for one model, chained in sequence

use crate::helpers::*;
use mlpipeline::build::{DependencyEdge, PipelineAssembler};
use mlpipeline::core::StepKind;
use mlpipeline::platform::{DefinitionStepFactory, PlatformStepType};
use serde_json::json;

fn assemble_demo() -> mlpipeline::build::PipelineDefinition {
    let factory = DefinitionStepFactory::new();
    PipelineAssembler::new(&factory)
        .with_source_dir_fallback(None)
        .assemble(&demo_conf())
        .unwrap()
}

/// Six built steps, five sequential edges, nothing left unconnected
#[test]
fn test_demo_pipeline_shape() {
    let definition = assemble_demo();

    assert_eq!(definition.name, "demo-pipeline");
    assert_eq!(definition.steps.len(), 6);
    let kinds: Vec<StepKind> = definition.steps.iter().map(|step| step.kind).collect();
    assert_eq!(kinds, StepKind::ALL.to_vec());

    let expected: Vec<DependencyEdge> = [
        ("demo-Preprocessing", "demo-Training"),
        ("demo-Training", "demo-CreateModel"),
        ("demo-CreateModel", "demo-Transform"),
        ("demo-Transform", "demo-Metrics"),
        ("demo-Metrics", "demo-Register"),
    ]
    .into_iter()
    .map(|(source, destination)| DependencyEdge::new(source, destination))
    .collect();
    assert_eq!(definition.edges, expected);
    assert!(definition.orphans().is_empty());
}

/// Composite steps take dependencies on their first inner sub-step and
/// hand their last inner sub-step to the steps after them
#[test]
fn test_composite_steps_in_definition_document() {
    let document = assemble_demo().to_document();
    assert_eq!(document["Version"], "2020-12-01");

    let steps = document["Steps"].as_array().unwrap();
    let names: Vec<&str> = steps.iter().map(|step| step["Name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "demo-Preprocessing",
            "demo-Training",
            "demo-CreateModel-RepackModel",
            "demo-CreateModel-CreateModel",
            "demo-Transform",
            "demo-Metrics",
            "demo-Register-RepackModel",
            "demo-Register-RegisterModel",
        ]
    );

    let depends_on = |name: &str| {
        steps
            .iter()
            .find(|step| step["Name"] == name)
            .and_then(|step| step.get("DependsOn").cloned())
    };
    assert_eq!(depends_on("demo-Preprocessing"), None);
    assert_eq!(depends_on("demo-CreateModel-RepackModel"), Some(json!(["demo-Training"])));
    assert_eq!(depends_on("demo-CreateModel-CreateModel"), None);
    assert_eq!(depends_on("demo-Transform"), Some(json!(["demo-CreateModel-CreateModel"])));
    assert_eq!(depends_on("demo-Register-RepackModel"), Some(json!(["demo-Metrics"])));
}

#[test]
fn test_chained_data_flows_through_property_references() {
    let definition = assemble_demo();

    let training = &definition.step("demo-Training").unwrap().step.arguments;
    assert_eq!(
        training["InputDataConfig"][0]["DataSource"]["S3DataSource"]["S3Uri"],
        json!({ "Get": "Steps.demo-Preprocessing.ProcessingOutputConfig.Outputs['train'].S3Output.S3Uri" })
    );

    let metrics = &definition.step("demo-Metrics").unwrap().step;
    assert_eq!(
        metrics.arguments["ProcessingInputs"][0]["S3Input"]["S3Uri"],
        json!({ "Get": "Steps.demo-Transform.TransformOutput.S3OutputPath" })
    );
    assert_eq!(metrics.property_files[0].path, "model_evaluation_metrics.json");

    let register = definition
        .step("demo-Register")
        .unwrap()
        .step
        .find(PlatformStepType::RegisterModel)
        .unwrap();
    assert_eq!(register.arguments["ModelPackageGroupName"], "acme-demo");
    assert_eq!(
        register.arguments["ModelMetrics"]["ModelQuality"]["Statistics"]["S3Uri"],
        "s3://acme-data/metrics/demo/evaluation/model_evaluation_metrics.json"
    );
}

/// Assembling the same configuration twice yields the same document
#[test]
fn test_assembly_is_deterministic() {
    let first = assemble_demo().to_json_pretty().unwrap();
    let second = assemble_demo().to_json_pretty().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_factory_called_once_per_step_in_order() {
    let (result, calls) = assemble_recorded(&demo_conf());
    result.unwrap();

    let names: Vec<&str> = calls.iter().map(|(_, name)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "demo-Preprocessing",
            "demo-Training",
            "demo-CreateModel",
            "demo-Transform",
            "demo-Metrics",
            "demo-Register",
        ]
    );
    assert_eq!(calls[2].0, PlatformStepType::Model);
    assert_eq!(calls[5].0, PlatformStepType::RegisterModel);
}

/// Without a topology section, `models.modelName` yields the default six-step pipeline
#[test]
fn test_default_topology_from_model_name() {
    let mut root = demo_conf().root().clone();
    let mapping = root.as_mapping_mut().unwrap();
    mapping.remove("sagemakerPipeline");

    let models = mapping
        .get_mut("models")
        .and_then(|models| models.as_mapping_mut())
        .unwrap();
    let demo = models.remove("demo").unwrap();
    models.insert("demomodel".into(), demo);
    models.insert("modelName".into(), "demomodel".into());
    let conf = mlpipeline::core::ConfigDocument::new(root);

    let (result, calls) = assemble_recorded(&conf);
    let definition = result.unwrap();

    assert_eq!(definition.name, "acme-demo-pipeline");
    assert_eq!(calls.len(), 6);
    assert_eq!(definition.edges.len(), 5);
    assert_eq!(definition.steps[0].name, "demo-Preprocessing");
    assert_eq!(definition.models(), vec!["demomodel"]);
}
