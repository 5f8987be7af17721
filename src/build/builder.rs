//! Step building: one configured step in, one platform step out

use crate::build::{
    context::ModelContext,
    definition::{BuiltStep, ManifestFile},
    error::{BuildError, BuildResult},
    inputs::{
        chain_sources, channel_bucket, channel_names, channel_prefix, channel_section,
        check_static_limit, declared_files, local_path, manifest_input, manifest_mode,
        source_outputs, static_processing_inputs, ChainOutput, DataFile, PROCESSING_INPUT_PATH,
        PROCESSING_OUTPUT_PATH, STATIC_INPUT_LIMIT,
    },
};
use crate::core::{
    document::ConfigDocument,
    pipeline::project_name,
    s3,
    step::{StepConfig, StepKind},
};
use crate::platform::{
    requests::{DEFAULT_INSTANCE_TYPE, JobDefaults},
    CacheConfig, DataSource, JobSettings, MetricsRequest, ModelMetricsSource, ModelRequest,
    NetworkSettings, PlatformError, PlatformStep, PlatformStepFactory, PlatformStepType,
    ProcessingInput, ProcessingOutput, ProcessingRequest, PropertyFile, PropertyRef,
    RegisterRequest, S3DataType, TrainingChannel, TrainingRequest, TransformRequest,
    TransformSettings,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Environment variable consulted when a model declares no `source_directory`
pub const SOURCE_DIR_ENV: &str = "SMP_SOURCE_DIR_PATH";

/// Output of a metrics step and the report file it writes
pub const EVALUATION_OUTPUT: &str = "model_evaluation_metrics";
pub const EVALUATION_REPORT: &str = "EvaluationReport";

pub const DEFAULT_APPROVAL_STATUS: &str = "PendingManualApproval";
const DEFAULT_INFERENCE_ENTRY_POINT: &str = "inference.py";
const DEFAULT_PACKAGE_DESCRIPTION: &str =
    "Default model package description. Add a custom ModelPackageDescription under registry.";

/// Builds one platform step per configured step
///
/// Builders are cheap: they borrow the merged configuration and the
/// platform binding and keep no state between steps. Per-model state lives
/// in the [`ModelContext`] the caller passes in.
pub struct StepBuilder<'a> {
    conf: &'a ConfigDocument,
    factory: &'a dyn PlatformStepFactory,
    network: NetworkSettings,
    source_dir_fallback: Option<String>,
}

impl<'a> StepBuilder<'a> {
    pub fn new(conf: &'a ConfigDocument, factory: &'a dyn PlatformStepFactory) -> Self {
        Self {
            conf,
            factory,
            network: NetworkSettings::from_config(conf),
            source_dir_fallback: std::env::var(SOURCE_DIR_ENV).ok(),
        }
    }

    /// Override the fallback for models without a `source_directory`
    pub fn with_source_dir_fallback(mut self, source_dir: Option<String>) -> Self {
        self.source_dir_fallback = source_dir;
        self
    }

    /// Build `spec` for `model`
    ///
    /// `prior` holds every step built so far, from this and earlier models;
    /// chained inputs may reference any of them. `context` records the steps
    /// already built for this model and is checked for the step kind's
    /// prerequisite before anything else.
    pub fn build(
        &self,
        spec: &StepConfig,
        model: &str,
        context: &ModelContext,
        prior: &[BuiltStep],
    ) -> BuildResult<BuiltStep> {
        context.require(spec)?;

        let built = match spec.step_class {
            StepKind::Processing => self.build_processing(spec, model, prior)?,
            StepKind::Training => self.build_training(spec, model, prior)?,
            StepKind::CreateModel => self.build_create_model(spec, model, context, prior)?,
            StepKind::Transform => self.build_transform(spec, model, context, prior)?,
            StepKind::Metrics => self.build_metrics(spec, model, prior)?,
            StepKind::RegisterModel => self.build_register(spec, model, context, prior)?,
        };

        info!(
            "Built {} step '{}' for model '{}'",
            spec.step_class, spec.step_name, model
        );
        Ok(built)
    }

    fn build_processing(&self, spec: &StepConfig, model: &str, prior: &[BuiltStep]) -> BuildResult<BuiltStep> {
        let section_name = required_section(spec)?;
        let (section_path, section) = self.section(model, section_name);

        let distribution = section.get_string_or("s3_data_distribution_type", "FullyReplicated");
        let input_root = section.get_string_or("inputLocalFilepath", PROCESSING_INPUT_PATH);

        let (mut inputs, manifests) = self.static_inputs(
            spec,
            model,
            section_name,
            &section,
            &section_path,
            &input_root,
            &distribution,
        )?;

        for output in self.chained_outputs(spec, prior)? {
            let name = format!("{}-input-{}", output.source_step, output.channel);
            inputs.push(ProcessingInput {
                destination: local_path(&input_root, &name),
                name,
                source: output.uri,
                s3_data_type: S3DataType::S3Prefix,
                distribution: distribution.clone(),
            });
        }

        let output_root = section
            .get_str("location.outputLocalFilepath")
            .or_else(|| section.get_str("outputLocalFilepath"))
            .unwrap_or(PROCESSING_OUTPUT_PATH);
        let outputs = channel_names(&section)
            .into_iter()
            .map(|channel| ProcessingOutput {
                source: local_path(output_root, &channel),
                name: channel,
                destination: None,
            })
            .collect();

        let request = ProcessingRequest {
            step_name: spec.step_name.clone(),
            model: model.to_string(),
            job: JobSettings::from_section(&section, JobDefaults::PROCESSING, self.source_directory(model)),
            network: self.network.clone(),
            framework_version: section.get_string_or("framework_version", "0"),
            inputs,
            outputs,
            cache: cache_config(spec),
        };

        let step = self
            .factory
            .make_processing_step(&request)
            .map_err(platform_error(spec))?;

        let mut built = self.built(spec, model, Some(section_name), step);
        built.manifests = manifests;
        Ok(built)
    }

    fn build_training(&self, spec: &StepConfig, model: &str, prior: &[BuiltStep]) -> BuildResult<BuiltStep> {
        let section_name = required_section(spec)?;
        let (section_path, section) = self.section(model, section_name);

        let content_type = section.get_str("content_type").map(str::to_string);
        let input_mode = section.get_string_or("input_mode", "File");
        let distribution = section.get_string_or("distribution", "FullyReplicated");
        let channel = |name: String, source: DataSource| TrainingChannel {
            name,
            source,
            content_type: content_type.clone(),
            input_mode: input_mode.clone(),
            distribution: distribution.clone(),
        };

        let files = declared_files(self.conf, &section, &section_path, true)?;
        check_static_limit(spec.step_class.label(), &spec.step_name, files.len(), STATIC_INPUT_LIMIT)?;

        let mut channels: Vec<TrainingChannel> = files
            .into_iter()
            .map(|file| channel(file.channel, DataSource::Uri(file.uri)))
            .collect();
        for output in self.chained_outputs(spec, prior)? {
            channels.push(channel(
                format!("{}-{}", output.source_step, output.channel),
                output.uri,
            ));
        }

        let request = TrainingRequest {
            step_name: spec.step_name.clone(),
            model: model.to_string(),
            job: JobSettings::from_section(&section, JobDefaults::TRAINING, self.source_directory(model)),
            network: self.network.clone(),
            output_path: section.get_str("output_path").map(str::to_string),
            hyperparameters: crate::platform::requests::string_map(section.get("hyperparams")),
            model_data_uri: section.get_str("model_data_uri").map(str::to_string),
            channels,
            cache: cache_config(spec),
        };

        let step = self
            .factory
            .make_training_step(&request)
            .map_err(platform_error(spec))?;
        Ok(self.built(spec, model, Some(section_name), step))
    }

    fn build_create_model(
        &self,
        spec: &StepConfig,
        model: &str,
        context: &ModelContext,
        prior: &[BuiltStep],
    ) -> BuildResult<BuiltStep> {
        let training = find_built(spec, prior, context.require_kind(spec, StepKind::Training)?)?;
        let request = self.model_request(spec, model, training);

        let mut step = self
            .factory
            .make_model_step(&request)
            .map_err(platform_error(spec))?;
        apply_composite_cache(&mut step, cache_config(spec));
        Ok(self.built(spec, model, spec.section(), step))
    }

    fn build_transform(
        &self,
        spec: &StepConfig,
        model: &str,
        context: &ModelContext,
        prior: &[BuiltStep],
    ) -> BuildResult<BuiltStep> {
        let create_model = find_built(spec, prior, context.require_kind(spec, StepKind::CreateModel)?)?;
        let model_step_name = create_model
            .step
            .find(PlatformStepType::Model)
            .map(|step| step.name.as_str())
            .unwrap_or_else(|| create_model.step.dependency_source_name());

        let section_name = required_section(spec)?;
        let (section_path, section) = self.section(model, section_name);
        let channel = single_channel(spec, &section)?;
        let channel_doc = channel_section(&section, &channel);

        let sources = chain_sources(spec, prior)?;
        if sources.len() > 1 {
            return Err(BuildError::TooManyChainSources {
                step: spec.step_name.clone(),
                limit: 1,
                count: sources.len(),
            });
        }

        let input = match sources.first() {
            Some(source) => {
                let outputs = source_outputs(source, self.conf);
                let output = outputs
                    .iter()
                    .find(|output| output.channel == channel)
                    .or_else(|| outputs.first())
                    .cloned();
                let suffix = spec.chain_input_additional_prefix.as_deref().unwrap_or_default();
                output.map(|output| output.uri.join_path(suffix))
            }
            None => {
                let files: Vec<DataFile> = declared_files(self.conf, &section, &section_path, false)?
                    .into_iter()
                    .filter(|file| file.channel == channel)
                    .collect();
                check_static_limit(spec.step_class.label(), &spec.step_name, files.len(), 1)?;
                files.into_iter().next().map(|file| DataSource::Uri(file.uri))
            }
        };

        let output_path = channel_bucket(self.conf, &section, &channel_doc).map(|bucket| {
            s3::join(
                &bucket,
                &[channel_prefix(&section, &channel_doc).as_str(), model, "predictions/transform"],
            )
        });

        let request = TransformRequest {
            step_name: spec.step_name.clone(),
            model: model.to_string(),
            model_name: PropertyRef::model_name(model_step_name).into(),
            settings: TransformSettings::from_section(&section),
            network: self.network.clone(),
            input,
            output_path,
            cache: cache_config(spec),
        };

        let step = self
            .factory
            .make_transform_step(&request)
            .map_err(platform_error(spec))?;
        Ok(self.built(spec, model, Some(section_name), step))
    }

    fn build_metrics(&self, spec: &StepConfig, model: &str, prior: &[BuiltStep]) -> BuildResult<BuiltStep> {
        let section_name = required_section(spec)?;
        let (section_path, section) = self.section(model, section_name);

        // the static input cap is checked before the evaluation channel is pinned
        if !manifest_mode(&section) {
            let count = declared_files(self.conf, &section, &section_path, true)?.len();
            check_static_limit(spec.step_class.label(), &spec.step_name, count, STATIC_INPUT_LIMIT)?;
        }

        // only a channels mapping pins the single evaluation channel
        let channel = match section.get_mapping("channels") {
            Some(_) => Some(single_channel(spec, &section)?),
            None => None,
        };
        let channel_doc = channel
            .as_deref()
            .map(|channel| channel_section(&section, channel))
            .unwrap_or_default();

        let distribution = section.get_string_or("s3_data_distribution_type", "FullyReplicated");
        let input_root = channel_doc
            .get_str("InputLocalFilepath")
            .or_else(|| section.get_str("inputLocalFilepath"))
            .unwrap_or(PROCESSING_INPUT_PATH)
            .to_string();
        let output_source = channel_doc
            .get_str("OutputLocalFilepath")
            .unwrap_or(PROCESSING_OUTPUT_PATH)
            .to_string();

        let (mut inputs, manifests) = self.static_inputs(
            spec,
            model,
            section_name,
            &section,
            &section_path,
            &input_root,
            &distribution,
        )?;

        for source in chain_sources(spec, prior)? {
            let outputs = source_outputs(source, self.conf);
            let matching: Vec<ChainOutput> = match &channel {
                Some(channel) if outputs.iter().any(|output| &output.channel == channel) => outputs
                    .into_iter()
                    .filter(|output| &output.channel == channel)
                    .collect(),
                _ => outputs,
            };
            for output in matching {
                let name = format!("{}-input-{}", output.source_step, output.channel);
                inputs.push(ProcessingInput {
                    destination: local_path(
                        &input_root,
                        &format!("{}-{}", output.source_step, output.channel),
                    ),
                    name,
                    source: output.uri,
                    s3_data_type: S3DataType::S3Prefix,
                    distribution: distribution.clone(),
                });
            }
        }

        let destination = channel.as_ref().and_then(|_| {
            channel_bucket(self.conf, &section, &channel_doc).map(|bucket| {
                s3::join_dir(
                    &bucket,
                    &[channel_prefix(&section, &channel_doc).as_str(), model, "evaluation"],
                )
            })
        });

        let report_file = format!("{}.json", EVALUATION_OUTPUT);
        let evaluation_report = match &destination {
            Some(destination) => DataSource::Uri(format!("{}{}", destination, report_file)),
            None => DataSource::from(PropertyRef::processing_output(&spec.step_name, EVALUATION_OUTPUT))
                .join_path(&report_file),
        };

        let request = MetricsRequest {
            processing: ProcessingRequest {
                step_name: spec.step_name.clone(),
                model: model.to_string(),
                job: JobSettings::from_section(&section, JobDefaults::METRICS, self.source_directory(model)),
                network: self.network.clone(),
                framework_version: section.get_string_or("framework_version", "0"),
                inputs,
                outputs: vec![ProcessingOutput {
                    name: EVALUATION_OUTPUT.to_string(),
                    source: output_source,
                    destination,
                }],
                cache: cache_config(spec),
            },
            report: PropertyFile {
                name: EVALUATION_REPORT.to_string(),
                output_name: EVALUATION_OUTPUT.to_string(),
                path: report_file,
            },
        };

        let step = self
            .factory
            .make_metrics_step(&request)
            .map_err(platform_error(spec))?;

        let mut built = self.built(spec, model, Some(section_name), step);
        built.manifests = manifests;
        built.evaluation_report = Some(evaluation_report);
        Ok(built)
    }

    fn build_register(
        &self,
        spec: &StepConfig,
        model: &str,
        context: &ModelContext,
        prior: &[BuiltStep],
    ) -> BuildResult<BuiltStep> {
        let training = find_built(spec, prior, context.require_kind(spec, StepKind::Training)?)?;
        let metrics = match context.latest(StepKind::Metrics) {
            Some(name) => Some(find_built(spec, prior, name)?),
            None => None,
        };

        let registry = self.conf.section(&format!("models.{}.registry", model));
        let inference = registry.section("InferenceSpecification");
        let list_or = |key: &str, default: &[&str]| -> BuildResult<Vec<String>> {
            let values = inference.get_string_list(key)?;
            Ok(if values.is_empty() {
                default.iter().map(|value| value.to_string()).collect()
            } else {
                values
            })
        };

        let model_metrics = metrics
            .and_then(|metrics| metrics.evaluation_report.clone())
            .map(|s3_uri| ModelMetricsSource {
                content_type: self
                    .conf
                    .get_string_or(&format!("models.{}.evaluate.content_type", model), "application/json"),
                s3_uri,
            });

        let request = RegisterRequest {
            step_name: spec.step_name.clone(),
            model: model.to_string(),
            model_request: self.model_request(spec, model, training),
            package_group: format!("{}-{}", project_name(self.conf), model),
            description: registry.get_string_or("ModelPackageDescription", DEFAULT_PACKAGE_DESCRIPTION),
            content_types: list_or("supported_content_types", &[])?,
            response_types: list_or("supported_response_MIME_types", &[])?,
            inference_instances: list_or("SupportedRealtimeInferenceInstanceTypes", &[DEFAULT_INSTANCE_TYPE])?,
            transform_instances: list_or("SupportedTransformInstanceTypes", &[DEFAULT_INSTANCE_TYPE])?,
            approval_status: inference.get_string_or("approval_status", DEFAULT_APPROVAL_STATUS),
            model_metrics,
        };

        let mut step = self
            .factory
            .make_register_step(&request)
            .map_err(platform_error(spec))?;
        apply_composite_cache(&mut step, cache_config(spec));
        Ok(self.built(spec, model, spec.section(), step))
    }

    /// Model definition shared by model creation and registration
    fn model_request(&self, spec: &StepConfig, model: &str, training: &BuiltStep) -> ModelRequest {
        let registry = self.conf.section(&format!("models.{}.registry", model));
        let repack = registry.get_bool("ModelRepack").unwrap_or(true);
        let entry_point = self.conf.get_string_or(
            &format!("models.{}.transform.entry_point", model),
            DEFAULT_INFERENCE_ENTRY_POINT,
        );

        let mut environment = BTreeMap::new();
        if !repack {
            environment.insert("SAGEMAKER_SUBMIT_DIRECTORY".to_string(), "/opt/ml/model/code".to_string());
            environment.insert(
                "SAGEMAKER_PROGRAM".to_string(),
                entry_point.trim_end_matches(".py").replace('/', "."),
            );
            environment.insert("SAGEMAKER_REQUIREMENTS".to_string(), "requirements.txt".to_string());
        }

        ModelRequest {
            step_name: spec.step_name.clone(),
            model: model.to_string(),
            model_name: self.conf.get_str(&format!("models.{}.name", model)).map(str::to_string),
            image_uri: registry
                .get_str("InferenceSpecification.image_uri")
                .map(str::to_string),
            model_data: PropertyRef::model_artifacts(training.step.dependency_source_name()).into(),
            repack,
            source_directory: self.source_directory(model),
            entry_point,
            environment,
            network: self.network.clone(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
        }
    }

    /// Static processing inputs, batched into a manifest when the section asks for it
    ///
    /// Each channel contributes its first data file.
    #[allow(clippy::too_many_arguments)]
    fn static_inputs(
        &self,
        spec: &StepConfig,
        model: &str,
        section_name: &str,
        section: &ConfigDocument,
        section_path: &str,
        input_root: &str,
        distribution: &str,
    ) -> BuildResult<(Vec<ProcessingInput>, Vec<ManifestFile>)> {
        let files = declared_files(self.conf, section, section_path, true)?;

        if manifest_mode(section) && !files.is_empty() {
            let file_name = format!("{}_{}_input.manifest", model, section_name);
            debug!(
                "Step '{}' batches {} static inputs into {}",
                spec.step_name,
                files.len(),
                file_name
            );
            let (manifest, input) =
                manifest_input(self.conf, section, section_path, file_name, &files, input_root)?;
            return Ok((vec![input], vec![manifest]));
        }

        check_static_limit(spec.step_class.label(), &spec.step_name, files.len(), STATIC_INPUT_LIMIT)?;
        Ok((static_processing_inputs(&files, input_root, distribution), Vec::new()))
    }

    fn chained_outputs(&self, spec: &StepConfig, prior: &[BuiltStep]) -> BuildResult<Vec<ChainOutput>> {
        Ok(chain_sources(spec, prior)?
            .into_iter()
            .flat_map(|source| source_outputs(source, self.conf))
            .collect())
    }

    fn section(&self, model: &str, section_name: &str) -> (String, ConfigDocument) {
        let path = format!("models.{}.{}", model, section_name);
        let section = self.conf.section(&path);
        (path, section)
    }

    fn source_directory(&self, model: &str) -> Option<String> {
        self.conf
            .get_str(&format!("models.{}.source_directory", model))
            .map(str::to_string)
            .or_else(|| self.source_dir_fallback.clone())
    }

    fn built(&self, spec: &StepConfig, model: &str, section: Option<&str>, step: PlatformStep) -> BuiltStep {
        let mut built = BuiltStep::new(&spec.step_name, spec.step_class, model, step);
        built.section = section.map(str::to_string);
        built
    }
}

fn required_section(spec: &StepConfig) -> BuildResult<&str> {
    spec.section().ok_or_else(|| BuildError::MissingStepType {
        step: spec.step_name.clone(),
        kind: spec.step_class,
    })
}

/// The one channel of a single-channel section
fn single_channel(spec: &StepConfig, section: &ConfigDocument) -> BuildResult<String> {
    let mut channels = channel_names(section);
    if channels.len() != 1 {
        return Err(BuildError::AmbiguousChannel {
            step: spec.step_name.clone(),
            channels,
        });
    }
    Ok(channels.remove(0))
}

fn find_built<'p>(spec: &StepConfig, prior: &'p [BuiltStep], name: &str) -> BuildResult<&'p BuiltStep> {
    prior
        .iter()
        .rev()
        .find(|step| step.name == name)
        .ok_or_else(|| BuildError::ChainSourceNotBuilt {
            step: spec.step_name.clone(),
            source_step: name.to_string(),
        })
}

fn cache_config(spec: &StepConfig) -> Option<CacheConfig> {
    spec.enable_cache.then(CacheConfig::enabled)
}

/// Composite steps cache their training-type sub-steps only
fn apply_composite_cache(step: &mut PlatformStep, cache: Option<CacheConfig>) {
    let Some(cache) = cache else { return };
    for inner in step.inner.iter_mut() {
        if inner.step_type == PlatformStepType::Training {
            inner.cache_config = Some(cache.clone());
        }
    }
}

fn platform_error(spec: &StepConfig) -> impl Fn(PlatformError) -> BuildError + '_ {
    move |source| BuildError::Platform {
        step: spec.step_name.clone(),
        source,
    }
}
