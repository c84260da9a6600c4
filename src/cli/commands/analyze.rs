//! Commands that inspect a PDF without registering it.

use std::path::Path;

use console::style;

use docpipe::config::{Config, Settings};
use docpipe::extraction::ExtractionContext;
use docpipe::registry::TypeRegistry;

use super::{read_pdf, services};

const PREVIEW_CHARS: usize = 240;

/// Extract and classify a file.
pub async fn cmd_classify(
    settings: &Settings,
    config: &Config,
    file: &Path,
    use_ai: bool,
) -> anyhow::Result<()> {
    let services = services(settings, config).await?;
    let (bytes, filename) = read_pdf(file).await?;

    let ctx = ExtractionContext::new(bytes, filename.clone()).with_config(&services.extraction);
    let extraction = services.extractor.extract(&ctx).await;
    let text = if extraction.success {
        extraction.text.as_deref()
    } else {
        println!(
            "{} Extraction failed ({}): {}",
            style("!").yellow(),
            extraction.method,
            extraction.error.as_deref().unwrap_or("unknown error")
        );
        None
    };

    let result = services.classifier.classify(&filename, text, use_ai).await;
    println!(
        "{} {} ({:.2} via {})",
        style("✓").green(),
        style(&result.document_type).bold(),
        result.confidence,
        result.method
    );
    if let Some(reasoning) = result.reasoning {
        println!("  {}", style(reasoning).dim());
    }
    if result.fallback_used {
        println!("  {}", style("below threshold; best available guess").yellow());
    }
    Ok(())
}

/// Detect logical documents inside a file.
pub async fn cmd_split(
    settings: &Settings,
    config: &Config,
    file: &Path,
    show_text: bool,
) -> anyhow::Result<()> {
    let services = services(settings, config).await?;
    let (bytes, filename) = read_pdf(file).await?;

    let analysis = services.boundary_detector().analyze(bytes, &filename).await;
    if let Some(ref error) = analysis.error {
        println!("{} {}", style("!").yellow(), error);
    }
    if analysis.segments.is_empty() {
        anyhow::bail!("no documents detected in {}", filename);
    }

    println!(
        "{} {} document(s) in {}{}",
        style("✓").green(),
        analysis.segments.len(),
        filename,
        if analysis.truncated { " (text truncated)" } else { "" }
    );
    for (i, segment) in analysis.segments.iter().enumerate() {
        let supported = if segment.is_supported_by_pipeline {
            style("supported").green()
        } else {
            style("unsupported").yellow()
        };
        println!(
            "  {}. {} [{}] lines {}-{} ({:.2}, {})",
            i + 1,
            style(&segment.document_type).bold(),
            supported,
            segment.start_line,
            segment.end_line,
            segment.confidence,
            if segment.resolution.is_precise() { "markers" } else { "line range" }
        );
        if let Some(ref title) = segment.title {
            println!("     {}", title);
        }
        if show_text {
            let preview: String = segment.fragment.chars().take(PREVIEW_CHARS).collect();
            println!("     {}", style(preview.replace('\n', " ")).dim());
        }
    }
    Ok(())
}

/// List the document types the pipeline extracts metadata for.
pub async fn cmd_types(settings: &Settings, _config: &Config) -> anyhow::Result<()> {
    let types = TypeRegistry::load(&settings.schema_path);
    println!("Schema: {}", types.source());
    for config in types.configs() {
        println!(
            "  {:<22} {:<28} table={} agent={}",
            style(&config.type_name).bold(),
            config.display_name,
            config.table_name,
            config.agent_name
        );
        if !config.required_fields.is_empty() {
            println!("  {:<22} required: {}", "", config.required_fields.join(", "));
        }
    }
    Ok(())
}
