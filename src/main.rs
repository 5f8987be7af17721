use anyhow::{Context, Result};
use mlpipeline::build::{PipelineAssembler, PipelineDefinition};
use mlpipeline::cli::commands::{BuildCommand, HistoryCommand, InspectCommand, ListCommand, ValidateCommand};
use mlpipeline::cli::output::*;
use mlpipeline::cli::{Cli, Command};
use mlpipeline::core::{pipeline::project_name, ConfigDocument, ConfigLoader, PipelineTopology};
use mlpipeline::persistence::{
    BuildRecord, BuildStatus, InMemoryPersistence, PersistenceBackend, SqliteBuildStore,
};
use mlpipeline::platform::DefinitionStepFactory;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Build(cmd) => build_pipeline(&cli, cmd).await?,
        Command::Validate(cmd) => validate_pipeline(&cli, cmd)?,
        Command::Inspect(cmd) => inspect_config(&cli, cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ConfigDocument> {
    let loader = ConfigLoader::new(&cli.root, &cli.conf);
    let conf = loader.load().with_context(|| {
        format!(
            "Failed to load configuration from {}",
            loader.base_document_path().display()
        )
    })?;
    println!(
        "{} Loaded configuration: {}",
        INFO,
        style(loader.base_document_path().display()).bold()
    );
    Ok(conf)
}

/// Name recorded in history, even when assembly fails before producing one
fn pipeline_name(conf: &ConfigDocument) -> String {
    PipelineTopology::from_document(conf)
        .map(|topology| topology.resolved_name(conf))
        .unwrap_or_else(|_| format!("{}-pipeline", project_name(conf)))
}

fn assemble(conf: &ConfigDocument, show_events: bool) -> Result<PipelineDefinition, mlpipeline::BuildError> {
    let factory = DefinitionStepFactory::new();
    let mut assembler = PipelineAssembler::new(&factory);
    if show_events {
        assembler.add_event_handler(|event| println!("{}", format_assembly_event(&event)));
    }
    assembler.assemble(conf)
}

async fn build_pipeline(cli: &Cli, cmd: &BuildCommand) -> Result<()> {
    let conf = load_config(cli)?;

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteBuildStore::with_default_path().await?)
    };

    println!();
    let record = match assemble(&conf, true) {
        Ok(definition) => {
            write_definition(&definition, &cmd.output)?;
            BuildRecord::succeeded(&definition, Some(&cmd.output))
        }
        Err(err) => BuildRecord::failed(pipeline_name(&conf), &err),
    };

    if !cmd.no_history {
        store.save_build(&record).await?;
        println!(
            "\n{} Build saved to history (ID: {})",
            INFO,
            style(&record.build_id.to_string()[..8]).dim()
        );
    }

    match (&record.status, &record.error) {
        (BuildStatus::Failed, Some(message)) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&record.pipeline_name).bold(),
                style("failed").red()
            );
            error!("{}", message);
            std::process::exit(1);
        }
        _ => {
            println!(
                "\n{} {} written to {}",
                CHECK,
                style(&record.pipeline_name).bold(),
                style(cmd.output.display()).green()
            );
        }
    }

    Ok(())
}

/// Write the definition and, next to it, any input manifests
fn write_definition(definition: &PipelineDefinition, output: &Path) -> Result<()> {
    let out_dir = output.parent().unwrap_or_else(|| Path::new(""));
    if !out_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    }

    let json = definition.to_json_pretty()?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote pipeline definition to {}", output.display());

    for manifest in definition.manifests() {
        let path = out_dir.join(&manifest.file_name);
        std::fs::write(&path, serde_json::to_string_pretty(&manifest.entries)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote input manifest to {}", path.display());
    }

    Ok(())
}

fn validate_pipeline(cli: &Cli, cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);
    let conf = load_config(cli)?;

    match assemble(&conf, false) {
        Ok(definition) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&definition.name).bold());
            println!("  Models: {}", style(definition.models().len()).cyan());
            println!("  Steps: {}", style(definition.steps.len()).cyan());
            println!("  Dependencies: {}", style(definition.edges.len()).cyan());
            println!("{}", format_definition_summary(&definition));

            for orphan in definition.orphans() {
                println!(
                    "{} Step {} is not part of any dependency chain",
                    WARN,
                    style(orphan).yellow()
                );
            }

            if cmd.json {
                println!("\n{}", definition.to_json_pretty()?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn inspect_config(cli: &Cli, cmd: &InspectCommand) -> Result<()> {
    let conf = load_config(cli)?;

    let yaml = match &cmd.path {
        Some(path) => match conf.get(path) {
            Some(value) => serde_yaml::to_string(value)?,
            None => {
                println!("{} Nothing configured at {}", WARN, style(path).yellow());
                return Ok(());
            }
        },
        None => conf.to_yaml()?,
    };
    println!("{}", yaml);

    Ok(())
}

async fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let store = SqliteBuildStore::with_default_path().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(());
    }

    println!("{} Pipelines in history:", INFO);

    let mut json_data = Vec::new();
    for pipeline_name in &pipelines {
        let builds = store.list_builds(pipeline_name).await?;

        if cmd.with_counts {
            let succeeded = builds.iter().filter(|b| b.status == BuildStatus::Succeeded).count();
            let failed = builds.len() - succeeded;
            println!(
                "  {} ({} builds: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(builds.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }

        json_data.push(serde_json::json!({
            "name": pipeline_name,
            "build_count": builds.len(),
        }));
    }

    if cmd.json {
        let data = serde_json::json!({ "pipelines": json_data });
        println!("\n{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteBuildStore::with_default_path().await?;

    if let Some(build_id) = &cmd.build_id {
        let build_id = uuid::Uuid::parse_str(build_id).context("Invalid build ID format")?;

        match store.load_build(build_id).await? {
            Some(record) => print_build_details(&record)?,
            None => println!("{} Build not found", WARN),
        }
        return Ok(());
    }

    let mut builds = match &cmd.pipeline {
        Some(pipeline_name) => store.list_builds(pipeline_name).await?,
        None => {
            let mut all_builds = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_builds.extend(store.list_builds(&pipeline).await?);
            }
            all_builds
        }
    };
    builds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    builds.truncate(cmd.limit);

    if builds.is_empty() {
        println!("{} No builds found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "builds": builds });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Build history (showing latest {}):", INFO, cmd.limit);
        for record in &builds {
            println!("  {}", format_build_record(record));
        }
    }

    Ok(())
}

fn print_build_details(record: &BuildRecord) -> Result<()> {
    println!("{} Build Details", INFO);
    println!("  ID: {}", style(record.build_id).cyan());
    println!("  Pipeline: {}", style(&record.pipeline_name).bold());
    println!("  Status: {}", format_status(record.status));
    println!("  Created: {}", style(record.created_at.to_rfc3339()).dim());
    println!(
        "  Models: {}  Steps: {}  Dependencies: {}",
        record.model_count, record.step_count, record.edge_count
    );
    if let Some(path) = &record.definition_path {
        println!("  Definition: {}", style(path).green());
    }
    if let Some(error) = &record.error {
        println!("  Error: {}", style(error).red());
    }

    Ok(())
}
