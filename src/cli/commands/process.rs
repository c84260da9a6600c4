//! Pipeline commands.

use console::style;

use docpipe::config::{Config, Settings};
use docpipe::models::ProcessingLevel;
use docpipe::pipeline::{PipelineOptions, PipelineOrchestrator};

use super::services;

/// Run (or reset and rerun) the pipeline for one document.
pub async fn cmd_process(
    settings: &Settings,
    config: &Config,
    id: &str,
    level: u8,
    reset: bool,
) -> anyhow::Result<()> {
    let level = ProcessingLevel::new(level)
        .ok_or_else(|| anyhow::anyhow!("level must be between 1 and 4, got {}", level))?;

    let services = services(settings, config).await?;
    let pipeline = PipelineOrchestrator::new(services, PipelineOptions::from(config));

    let outcome = if reset {
        pipeline.reprocess(id, level).await?
    } else {
        pipeline.process_document(id, level).await?
    };

    if outcome.stages_run.is_empty() {
        println!("{} Nothing to do for {}", style("✓").green(), style(id).cyan());
        return Ok(());
    }

    let stages: Vec<&str> = outcome.stages_run.iter().map(|s| s.as_str()).collect();
    println!(
        "{} Processed {}: {}",
        style("✓").green(),
        style(id).cyan(),
        stages.join(", ")
    );
    if let Some(strategy) = outcome.completed_by {
        println!("  {} completed every stage in one pass", style(strategy).bold());
    }
    Ok(())
}
