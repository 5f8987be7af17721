//! Test: Dependency wiring - chain expressions applied to built steps

use crate::helpers::*;
use mlpipeline::build::BuildError;
use mlpipeline::core::ConfigDocument;

fn conf_with_dependencies(dependencies: &str) -> ConfigDocument {
    let yaml = format!(
        r#"
sagemakerPipeline:
  models:
    alpha:
      steps:
        - {{ step_name: "alpha-Training", step_class: "Training" }}
        - {{ step_name: "alpha-CreateModel", step_class: "CreateModel" }}
    beta:
      steps:
        - {{ step_name: "beta-Training", step_class: "Training" }}
  dependencies:
{dependencies}
"#
    );
    ConfigDocument::from_yaml(&yaml).unwrap()
}

#[test]
fn test_missing_step_names_both_endpoints() {
    let conf = conf_with_dependencies("    - \"alpha-Training >> alpha-Typo\"");

    match assemble_recorded(&conf).0.unwrap_err() {
        BuildError::DependencyWiringFailure {
            source_step,
            destination_step,
            reason,
        } => {
            assert_eq!(source_step, "alpha-Training");
            assert_eq!(destination_step, "alpha-Typo");
            assert!(reason.contains("alpha-Typo"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_chains_span_models() {
    let conf = conf_with_dependencies(
        "    - \"alpha-Training >> alpha-CreateModel\"\n    - \"alpha-CreateModel >> beta-Training\"",
    );
    let definition = assemble_recorded(&conf).0.unwrap();

    assert_eq!(definition.edges.len(), 2);
    // composite destination: the first inner sub-step waits on training
    let create = &definition.step("alpha-CreateModel").unwrap().step;
    assert_eq!(create.inner[0].depends_on, vec!["alpha-Training"]);
    assert!(create.depends_on.is_empty());
    // composite source: later steps wait on its last inner sub-step
    assert_eq!(
        definition.step("beta-Training").unwrap().depends_on().to_vec(),
        vec!["alpha-CreateModel-CreateModel".to_string()]
    );
}

#[test]
fn test_duplicate_edges_are_applied_once() {
    let conf = conf_with_dependencies(
        "    - \"alpha-Training >> beta-Training\"\n    - \"alpha-Training >> beta-Training\"",
    );
    let definition = assemble_recorded(&conf).0.unwrap();
    assert_eq!(definition.edges.len(), 1);
    assert_eq!(definition.step("beta-Training").unwrap().depends_on().len(), 1);
}

#[test]
fn test_unchained_steps_are_reported_as_orphans() {
    let conf = conf_with_dependencies("    - \"alpha-Training >> alpha-CreateModel\"");
    let definition = assemble_recorded(&conf).0.unwrap();
    assert_eq!(definition.orphans(), vec!["beta-Training"]);
}

#[test]
fn test_duplicate_step_names_are_rejected() {
    let conf = ConfigDocument::from_yaml(
        r#"
sagemakerPipeline:
  models:
    alpha:
      steps:
        - { step_name: "shared", step_class: "Training" }
    beta:
      steps:
        - { step_name: "shared", step_class: "Training" }
"#,
    )
    .unwrap();

    let (result, calls) = assemble_recorded(&conf);
    assert!(matches!(result.unwrap_err(), BuildError::DuplicateStepName(ref name) if name == "shared"));
    assert!(calls.is_empty());
}
