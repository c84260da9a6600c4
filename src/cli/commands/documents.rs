//! Document registration and status commands.

use std::path::Path;

use console::style;

use docpipe::config::{Config, Settings};
use docpipe::models::{Document, Stage};
use docpipe::pipeline::open_store;
use docpipe::storage::FsBlobSource;

use super::{ensure_initialized, read_pdf, stage_line, styled_status};

/// Register a PDF, reusing the existing document when the content was seen before.
pub async fn cmd_add(settings: &Settings, config: &Config, file: &Path) -> anyhow::Result<()> {
    ensure_initialized(settings)?;
    let store = open_store(settings).await?;
    let (bytes, filename) = read_pdf(file).await?;

    let content_hash = Document::compute_hash(&bytes);
    if let Some(existing) = store.find_by_hash(&content_hash).await? {
        println!(
            "{} Already registered as {} ({})",
            style("!").yellow(),
            style(&existing.id).cyan(),
            existing.filename
        );
        return Ok(());
    }

    let blobs = FsBlobSource::new(settings.documents_dir.clone()).with_retry(config.retry);
    let source_path = blobs.store(&bytes, &content_hash, &filename).await?;

    let document = Document::new(uuid::Uuid::new_v4().to_string(), source_path, filename, &bytes);
    store.insert(&document).await?;

    println!(
        "{} Registered {} as {}",
        style("✓").green(),
        document.filename,
        style(&document.id).cyan()
    );
    Ok(())
}

/// Show one document in detail, or every document on one line each.
pub async fn cmd_status(
    settings: &Settings,
    _config: &Config,
    id: Option<&str>,
) -> anyhow::Result<()> {
    ensure_initialized(settings)?;
    let store = open_store(settings).await?;

    let Some(id) = id else {
        let documents = store.list().await?;
        if documents.is_empty() {
            println!("{} No documents registered", style("!").yellow());
            return Ok(());
        }
        for doc in documents {
            println!(
                "{}  {:<32} {:<22} {}",
                style(&doc.id).cyan(),
                doc.filename,
                doc.document_type.as_deref().unwrap_or("-"),
                stage_line(&doc.statuses)
            );
        }
        return Ok(());
    };

    let doc = store
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", id))?;

    println!("{}", style(&doc.filename).bold());
    println!("  id:             {}", doc.id);
    println!("  size:           {} bytes", doc.file_size);
    println!("  sha256:         {}", doc.content_hash);
    for stage in Stage::ALL {
        println!("  {:<15} {}", format!("{}:", stage), styled_status(doc.status(stage)));
    }
    if let Some(ref method) = doc.extraction_method {
        println!(
            "  extraction:     {} ({} pages)",
            method,
            doc.page_count.map_or_else(|| "?".to_string(), |p| p.to_string())
        );
    }
    if let Some(ref doc_type) = doc.document_type {
        println!(
            "  type:           {} ({:.2}, {})",
            doc_type,
            doc.classification_confidence.unwrap_or(0.0),
            doc.classification_method.as_deref().unwrap_or("?")
        );
    }
    if let Some(count) = doc.chunk_count {
        println!("  chunks:         {}", count);
    }
    if let Some(ref error) = doc.last_error {
        println!("  last error:     {}", style(error).red());
    }
    Ok(())
}
