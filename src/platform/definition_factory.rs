//! Reference [`PlatformStepFactory`] rendering the platform's JSON definition schema

use crate::platform::{
    requests::{
        JobSettings, ModelRequest, MetricsRequest, NetworkSettings, ProcessingInput,
        ProcessingOutput, ProcessingRequest, RegisterRequest, TrainingRequest, TransformRequest,
    },
    step::{DataSource, PlatformStep, PlatformStepType, PropertyRef},
    PlatformError, PlatformStepFactory,
};
use serde_json::{json, Map, Value};
use tracing::debug;

const CODE_LOCAL_PATH: &str = "/opt/ml/processing/input/code";
const MODEL_ARCHIVE: &str = "model.tar.gz";

/// Renders every step as the arguments of the platform's create-job APIs
///
/// Unset optional arguments are omitted rather than rendered as `null`.
#[derive(Debug, Clone, Default)]
pub struct DefinitionStepFactory;

impl DefinitionStepFactory {
    pub fn new() -> Self {
        Self
    }

    fn processing_arguments(&self, request: &ProcessingRequest) -> Result<Value, PlatformError> {
        let job = &request.job;
        let image = required(&request.step_name, "image_uri", job.image_uri.as_deref())?;
        let entry_point = required(&request.step_name, "entry_point", job.entry_point.as_deref())?;

        let mut inputs: Vec<Value> = request.inputs.iter().map(processing_input).collect();
        if let Some(source_directory) = &job.source_directory {
            inputs.push(json!({
                "InputName": "code",
                "AppManaged": false,
                "S3Input": {
                    "S3Uri": source_directory,
                    "LocalPath": CODE_LOCAL_PATH,
                    "S3DataType": "S3Prefix",
                    "S3InputMode": "File",
                    "S3DataDistributionType": "FullyReplicated",
                },
            }));
        }

        Ok(json!({
            "ProcessingResources": {
                "ClusterConfig": {
                    "InstanceType": job.instance_type,
                    "InstanceCount": job.instance_count,
                    "VolumeSizeInGB": job.volume_size_in_gb,
                    "VolumeKmsKeyId": request.network.kms_key,
                }
            },
            "AppSpecification": {
                "ImageUri": image,
                "ContainerEntrypoint": ["python", "-m", module_path(entry_point)],
            },
            "RoleArn": request.network.role,
            "ProcessingInputs": inputs,
            "ProcessingOutputConfig": {
                "Outputs": request.outputs.iter().map(processing_output).collect::<Vec<_>>(),
                "KmsKeyId": request.network.kms_key,
            },
            "StoppingCondition": { "MaxRuntimeInSeconds": job.max_runtime_seconds },
            "Environment": job.environment,
            "NetworkConfig": network_config(&request.network),
            "Tags": tags(job),
        }))
    }

    fn repack_step(&self, request: &ModelRequest) -> PlatformStep {
        let arguments = json!({
            "AlgorithmSpecification": {
                "TrainingImage": request.image_uri,
                "TrainingInputMode": "File",
            },
            "HyperParameters": {
                "inference_script": request.entry_point,
                "model_archive": MODEL_ARCHIVE,
                "source_dir": request.source_directory,
            },
            "InputDataConfig": [{
                "ChannelName": "training",
                "DataSource": {
                    "S3DataSource": {
                        "S3DataType": "S3Prefix",
                        "S3Uri": request.model_data,
                        "S3DataDistributionType": "FullyReplicated",
                    }
                },
            }],
            "ResourceConfig": {
                "InstanceCount": 1,
                "InstanceType": request.instance_type,
                "VolumeSizeInGB": 30,
                "VolumeKmsKeyId": request.network.kms_key,
            },
            "RoleArn": request.network.role,
            "StoppingCondition": { "MaxRuntimeInSeconds": 86400 },
            "VpcConfig": vpc_config(&request.network),
        });
        PlatformStep::new(
            format!("{}-RepackModel", request.step_name),
            PlatformStepType::Training,
            prune(arguments),
        )
    }

    /// Inner sub-steps shared by model creation and registration
    ///
    /// Returns the optional repack sub-step and the model data URI the final
    /// sub-step should use.
    fn model_source(&self, request: &ModelRequest) -> (Option<PlatformStep>, DataSource) {
        if request.repack {
            let repack = self.repack_step(request);
            let model_data = PropertyRef::model_artifacts(&repack.name).into();
            (Some(repack), model_data)
        } else {
            (None, request.model_data.clone())
        }
    }

    fn container(&self, request: &ModelRequest, model_data: &DataSource) -> Value {
        json!({
            "Image": request.image_uri,
            "Environment": request.environment,
            "ModelDataUrl": model_data,
        })
    }
}

impl PlatformStepFactory for DefinitionStepFactory {
    fn make_processing_step(&self, request: &ProcessingRequest) -> Result<PlatformStep, PlatformError> {
        let arguments = self.processing_arguments(request)?;
        debug!("Rendered processing step '{}'", request.step_name);
        Ok(
            PlatformStep::new(&request.step_name, PlatformStepType::Processing, prune(arguments))
                .with_cache(request.cache.clone()),
        )
    }

    fn make_training_step(&self, request: &TrainingRequest) -> Result<PlatformStep, PlatformError> {
        let job = &request.job;
        let image = required(&request.step_name, "image_uri", job.image_uri.as_deref())?;

        let mut hyperparameters = request.hyperparameters.clone();
        if let Some(entry_point) = &job.entry_point {
            let (directory, program) = match entry_point.rsplit_once('/') {
                Some((directory, program)) => (Some(directory), program),
                None => (None, entry_point.as_str()),
            };
            hyperparameters.insert("sagemaker_program".to_string(), program.to_string());
            if let Some(source_directory) = &job.source_directory {
                let submit = match directory {
                    Some(directory) => format!("{}/{}", source_directory.trim_end_matches('/'), directory),
                    None => source_directory.clone(),
                };
                hyperparameters.insert("sagemaker_submit_directory".to_string(), submit);
            }
        }

        let mut channels: Vec<Value> = request
            .channels
            .iter()
            .map(|channel| {
                json!({
                    "ChannelName": channel.name,
                    "DataSource": {
                        "S3DataSource": {
                            "S3DataType": "S3Prefix",
                            "S3Uri": channel.source,
                            "S3DataDistributionType": channel.distribution,
                        }
                    },
                    "ContentType": channel.content_type,
                    "InputMode": channel.input_mode,
                })
            })
            .collect();
        if let Some(model_data_uri) = &request.model_data_uri {
            channels.push(json!({
                "ChannelName": "model",
                "DataSource": {
                    "S3DataSource": {
                        "S3DataType": "S3Prefix",
                        "S3Uri": model_data_uri,
                        "S3DataDistributionType": "FullyReplicated",
                    }
                },
                "ContentType": "application/x-sagemaker-model",
                "InputMode": "File",
            }));
        }

        let arguments = json!({
            "AlgorithmSpecification": {
                "TrainingImage": image,
                "TrainingInputMode": "File",
            },
            "OutputDataConfig": {
                "S3OutputPath": request.output_path,
                "KmsKeyId": request.network.kms_key,
            },
            "StoppingCondition": { "MaxRuntimeInSeconds": job.max_runtime_seconds },
            "ResourceConfig": {
                "VolumeSizeInGB": job.volume_size_in_gb,
                "InstanceCount": job.instance_count,
                "InstanceType": job.instance_type,
                "VolumeKmsKeyId": request.network.kms_key,
            },
            "RoleArn": request.network.role,
            "InputDataConfig": channels,
            "HyperParameters": hyperparameters,
            "Environment": job.environment,
            "VpcConfig": vpc_config(&request.network),
            "EnableNetworkIsolation": request.network.enable_network_isolation,
            "EnableInterContainerTrafficEncryption": request.network.encrypt_inter_container_traffic,
            "Tags": tags(job),
        });

        debug!("Rendered training step '{}'", request.step_name);
        Ok(
            PlatformStep::new(&request.step_name, PlatformStepType::Training, prune(arguments))
                .with_cache(request.cache.clone()),
        )
    }

    fn make_model_step(&self, request: &ModelRequest) -> Result<PlatformStep, PlatformError> {
        required(&request.step_name, "image_uri", request.image_uri.as_deref())?;
        let (repack, model_data) = self.model_source(request);

        let arguments = json!({
            "ModelName": request.model_name,
            "ExecutionRoleArn": request.network.role,
            "PrimaryContainer": self.container(request, &model_data),
            "VpcConfig": vpc_config(&request.network),
            "EnableNetworkIsolation": request.network.enable_network_isolation,
        });
        let create = PlatformStep::new(
            format!("{}-CreateModel", request.step_name),
            PlatformStepType::Model,
            prune(arguments),
        );

        let inner = repack.into_iter().chain(std::iter::once(create)).collect();
        Ok(PlatformStep::composite(&request.step_name, PlatformStepType::Model, inner))
    }

    fn make_transform_step(&self, request: &TransformRequest) -> Result<PlatformStep, PlatformError> {
        let input = request
            .input
            .as_ref()
            .ok_or_else(|| PlatformError::MissingArgument {
                step: request.step_name.clone(),
                argument: "TransformInput".to_string(),
            })?;
        let settings = &request.settings;

        let arguments = json!({
            "ModelName": request.model_name,
            "TransformInput": {
                "DataSource": {
                    "S3DataSource": {
                        "S3DataType": "S3Prefix",
                        "S3Uri": input,
                    }
                },
                "ContentType": settings.content_type,
                "SplitType": settings.split_type,
            },
            "TransformOutput": {
                "S3OutputPath": request.output_path,
                "Accept": settings.content_type,
                "AssembleWith": settings.assemble_with,
                "KmsKeyId": request.network.kms_key,
            },
            "TransformResources": {
                "InstanceCount": settings.instance_count,
                "InstanceType": settings.instance_type,
                "VolumeKmsKeyId": request.network.kms_key,
            },
            "BatchStrategy": settings.strategy,
            "MaxPayloadInMB": settings.max_payload,
            "DataProcessing": {
                "InputFilter": settings.input_filter,
                "OutputFilter": settings.output_filter,
                "JoinSource": settings.join_source,
            },
            "Environment": settings.environment,
            "Tags": tag_values(&settings.tags),
        });

        debug!("Rendered transform step '{}'", request.step_name);
        Ok(
            PlatformStep::new(&request.step_name, PlatformStepType::Transform, prune(arguments))
                .with_cache(request.cache.clone()),
        )
    }

    fn make_metrics_step(&self, request: &MetricsRequest) -> Result<PlatformStep, PlatformError> {
        let step = self.make_processing_step(&request.processing)?;
        Ok(step.with_property_file(request.report.clone()))
    }

    fn make_register_step(&self, request: &RegisterRequest) -> Result<PlatformStep, PlatformError> {
        let model = &request.model_request;
        required(&request.step_name, "image_uri", model.image_uri.as_deref())?;
        let (repack, model_data) = self.model_source(model);

        let model_metrics = request.model_metrics.as_ref().map(|metrics| {
            json!({
                "ModelQuality": {
                    "Statistics": {
                        "ContentType": metrics.content_type,
                        "S3Uri": metrics.s3_uri,
                    }
                }
            })
        });

        let arguments = json!({
            "ModelPackageGroupName": request.package_group,
            "ModelPackageDescription": request.description,
            "ModelApprovalStatus": request.approval_status,
            "InferenceSpecification": {
                "Containers": [self.container(model, &model_data)],
                "SupportedContentTypes": request.content_types,
                "SupportedResponseMIMETypes": request.response_types,
                "SupportedRealtimeInferenceInstanceTypes": request.inference_instances,
                "SupportedTransformInstanceTypes": request.transform_instances,
            },
            "ModelMetrics": model_metrics,
            "CustomerMetadataProperties": {
                "PIPELINE_ARN": { "Get": "Execution.PipelineExecutionArn" },
            },
            "CertifyForMarketplace": false,
        });
        let register = PlatformStep::new(
            format!("{}-RegisterModel", request.step_name),
            PlatformStepType::RegisterModel,
            prune(arguments),
        );

        let inner = repack.into_iter().chain(std::iter::once(register)).collect();
        Ok(PlatformStep::composite(&request.step_name, PlatformStepType::RegisterModel, inner))
    }
}

fn required<'a>(step: &str, argument: &str, value: Option<&'a str>) -> Result<&'a str, PlatformError> {
    value.ok_or_else(|| PlatformError::MissingArgument {
        step: step.to_string(),
        argument: argument.to_string(),
    })
}

/// `scripts/evaluate.py` runs as `python -m scripts.evaluate`
fn module_path(entry_point: &str) -> String {
    entry_point.trim_end_matches(".py").replace('/', ".")
}

fn processing_input(input: &ProcessingInput) -> Value {
    json!({
        "InputName": input.name,
        "AppManaged": false,
        "S3Input": {
            "S3Uri": input.source,
            "LocalPath": input.destination,
            "S3DataType": input.s3_data_type.as_str(),
            "S3InputMode": "File",
            "S3DataDistributionType": input.distribution,
        },
    })
}

fn processing_output(output: &ProcessingOutput) -> Value {
    json!({
        "OutputName": output.name,
        "AppManaged": false,
        "S3Output": {
            "S3Uri": output.destination,
            "LocalPath": output.source,
            "S3UploadMode": "EndOfJob",
        },
    })
}

fn vpc_config(network: &NetworkSettings) -> Option<Value> {
    network.has_vpc().then(|| {
        json!({
            "SecurityGroupIds": network.security_group_ids,
            "Subnets": network.subnets,
        })
    })
}

fn network_config(network: &NetworkSettings) -> Value {
    json!({
        "EnableInterContainerTrafficEncryption": network.encrypt_inter_container_traffic,
        "EnableNetworkIsolation": network.enable_network_isolation,
        "VpcConfig": vpc_config(network),
    })
}

fn tags(job: &JobSettings) -> Vec<Value> {
    tag_values(&job.tags)
}

fn tag_values(tags: &[(String, String)]) -> Vec<Value> {
    tags.iter()
        .map(|(key, value)| json!({ "Key": key, "Value": value }))
        .collect()
}

/// Drop `null` values and the empty objects and arrays left behind
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, prune(value)))
                .filter(|(_, value)| !is_empty(value))
                .collect();
            Value::Object(pruned)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(prune).collect()),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::requests::{JobDefaults, S3DataType, TrainingChannel};
    use crate::core::document::ConfigDocument;
    use std::collections::BTreeMap;

    fn job(image: Option<&str>) -> JobSettings {
        let mut job = JobSettings::from_section(&ConfigDocument::default(), JobDefaults::PROCESSING, None);
        job.image_uri = image.map(str::to_string);
        job.entry_point = Some("steps/preprocess.py".to_string());
        job
    }

    fn processing_request(image: Option<&str>) -> ProcessingRequest {
        ProcessingRequest {
            step_name: "demo-Preprocessing".to_string(),
            model: "demo".to_string(),
            job: job(image),
            network: NetworkSettings::default(),
            framework_version: "0".to_string(),
            inputs: vec![ProcessingInput {
                name: "raw".to_string(),
                source: DataSource::uri("s3://bucket/raw.csv"),
                destination: "/opt/ml/processing/input/raw".to_string(),
                s3_data_type: S3DataType::S3Prefix,
                distribution: "FullyReplicated".to_string(),
            }],
            outputs: vec![ProcessingOutput {
                name: "train".to_string(),
                source: "/opt/ml/processing/output/train".to_string(),
                destination: None,
            }],
            cache: None,
        }
    }

    #[test]
    fn test_processing_arguments() {
        let step = DefinitionStepFactory::new()
            .make_processing_step(&processing_request(Some("image:latest")))
            .unwrap();
        let arguments = &step.arguments;

        assert_eq!(step.step_type, PlatformStepType::Processing);
        assert_eq!(arguments["AppSpecification"]["ImageUri"], "image:latest");
        assert_eq!(
            arguments["AppSpecification"]["ContainerEntrypoint"],
            json!(["python", "-m", "steps.preprocess"])
        );
        assert_eq!(arguments["ProcessingInputs"][0]["S3Input"]["S3Uri"], "s3://bucket/raw.csv");
        // no destination and no role: both pruned
        assert!(arguments["ProcessingOutputConfig"]["Outputs"][0]["S3Output"].get("S3Uri").is_none());
        assert!(arguments.get("RoleArn").is_none());
        assert!(arguments["NetworkConfig"].get("VpcConfig").is_none());
    }

    #[test]
    fn test_missing_image_is_reported() {
        let err = DefinitionStepFactory::new()
            .make_processing_step(&processing_request(None))
            .unwrap_err();
        assert!(matches!(err, PlatformError::MissingArgument { ref argument, .. } if argument == "image_uri"));
    }

    #[test]
    fn test_training_channels_reference_upstream_outputs() {
        let request = TrainingRequest {
            step_name: "demo-Training".to_string(),
            model: "demo".to_string(),
            job: job(Some("train:latest")),
            network: NetworkSettings::default(),
            output_path: Some("s3://bucket/models".to_string()),
            hyperparameters: BTreeMap::new(),
            model_data_uri: None,
            channels: vec![TrainingChannel {
                name: "demo-Preprocessing-train".to_string(),
                source: PropertyRef::processing_output("demo-Preprocessing", "train").into(),
                content_type: None,
                input_mode: "File".to_string(),
                distribution: "FullyReplicated".to_string(),
            }],
            cache: None,
        };
        let step = DefinitionStepFactory::new().make_training_step(&request).unwrap();

        assert_eq!(
            step.arguments["InputDataConfig"][0]["DataSource"]["S3DataSource"]["S3Uri"],
            json!({ "Get": "Steps.demo-Preprocessing.ProcessingOutputConfig.Outputs['train'].S3Output.S3Uri" })
        );
        assert_eq!(step.arguments["HyperParameters"]["sagemaker_program"], "preprocess.py");
    }

    #[test]
    fn test_model_step_with_repack_is_composite() {
        let request = ModelRequest {
            step_name: "demo-CreateModel".to_string(),
            model: "demo".to_string(),
            model_name: None,
            image_uri: Some("inference:latest".to_string()),
            model_data: PropertyRef::model_artifacts("demo-Training").into(),
            repack: true,
            source_directory: Some("src".to_string()),
            entry_point: "inference".to_string(),
            environment: BTreeMap::new(),
            network: NetworkSettings::default(),
            instance_type: "ml.m5.2xlarge".to_string(),
        };
        let factory = DefinitionStepFactory::new();

        let step = factory.make_model_step(&request).unwrap();
        assert!(step.is_composite());
        assert_eq!(step.inner[0].name, "demo-CreateModel-RepackModel");
        assert_eq!(
            step.inner[1].arguments["PrimaryContainer"]["ModelDataUrl"],
            json!({ "Get": "Steps.demo-CreateModel-RepackModel.ModelArtifacts.S3ModelArtifacts" })
        );

        let direct = factory
            .make_model_step(&ModelRequest { repack: false, ..request })
            .unwrap();
        assert_eq!(direct.inner.len(), 1);
        assert_eq!(
            direct.inner[0].arguments["PrimaryContainer"]["ModelDataUrl"],
            json!({ "Get": "Steps.demo-Training.ModelArtifacts.S3ModelArtifacts" })
        );
    }

    #[test]
    fn test_prune_removes_nested_nulls() {
        let pruned = prune(json!({ "A": null, "B": { "C": null }, "D": [], "E": 0 }));
        assert_eq!(pruned, json!({ "E": 0 }));
    }
}
