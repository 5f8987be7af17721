//! CLI output formatting

use crate::{
    build::{AssemblyEvent, PipelineDefinition},
    persistence::{BuildRecord, BuildStatus},
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "+ ");

/// Format a build status for display
pub fn format_status(status: BuildStatus) -> String {
    match status {
        BuildStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        BuildStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a build record for display
pub fn format_build_record(record: &BuildRecord) -> String {
    let status_icon = match record.status {
        BuildStatus::Succeeded => CHECK,
        BuildStatus::Failed => CROSS,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} steps, {} dependencies - {}",
        status_icon,
        style(short_id(&record.build_id.to_string())).dim(),
        style(&record.pipeline_name).bold(),
        format_status(record.status),
        record.step_count,
        record.edge_count,
        style(record.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if let Some(error) = &record.error {
        line.push_str(&format!("\n      {}", style(error).red()));
    }
    line
}

/// Format an assembly event for display
pub fn format_assembly_event(event: &AssemblyEvent) -> String {
    match event {
        AssemblyEvent::AssemblyStarted {
            assembly_id,
            pipeline_name,
            model_count,
        } => format!(
            "{} Assembling pipeline {} from {} model(s) ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(model_count).cyan(),
            style(short_id(&assembly_id.to_string())).dim()
        ),
        AssemblyEvent::ModelStarted { model, step_count } => format!(
            "{} Model {} ({} steps)",
            INFO,
            style(model).bold(),
            step_count
        ),
        AssemblyEvent::StepBuilt {
            step_name, kind, ..
        } => format!("  {} {} {}", CHECK, style(step_name).green(), style(kind).dim()),
        AssemblyEvent::DependencyAdded {
            source,
            destination,
        } => format!(
            "  {} {} → {}",
            LINK,
            style(source).dim(),
            style(destination).cyan()
        ),
        AssemblyEvent::AssemblyCompleted {
            pipeline_name,
            step_count,
            edge_count,
            ..
        } => format!(
            "{} {} assembled: {} steps, {} dependencies",
            CHECK,
            style(pipeline_name).bold(),
            style(step_count).cyan(),
            style(edge_count).cyan()
        ),
    }
}

/// One line per step with what it depends on
pub fn format_definition_summary(definition: &PipelineDefinition) -> String {
    definition
        .steps
        .iter()
        .map(|step| {
            let after = if step.depends_on().is_empty() {
                String::new()
            } else {
                format!(" after {}", step.depends_on().join(", "))
            };
            format!(
                "  {} [{}] {}{}",
                style(&step.name).bold(),
                step.kind,
                style(&step.model).dim(),
                style(after).dim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
