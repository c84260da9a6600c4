//! Command implementations.

pub mod analyze;
pub mod documents;
pub mod init;
pub mod process;

use std::path::Path;

use anyhow::Context;
use console::style;

use docpipe::config::{Config, Settings};
use docpipe::models::{Stage, StageStatus, StageStatuses};
use docpipe::pipeline::Services;

/// Build services, failing with a hint when the database is missing.
pub(crate) async fn services(settings: &Settings, config: &Config) -> anyhow::Result<Services> {
    ensure_initialized(settings)?;
    Ok(Services::build(settings, config).await?)
}

pub(crate) fn ensure_initialized(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        anyhow::bail!(
            "no database at {}; run `docpipe init` first",
            settings.database_path().display()
        );
    }
    Ok(())
}

/// Read a PDF and return its bytes with the filename used for classification.
pub(crate) async fn read_pdf(path: &Path) -> anyhow::Result<(Vec<u8>, String)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    Ok((bytes, filename))
}

pub(crate) fn styled_status(status: StageStatus) -> String {
    match status {
        StageStatus::Completed => style(status.as_str()).green().to_string(),
        StageStatus::Failed => style(status.as_str()).red().to_string(),
        StageStatus::Processing => style(status.as_str()).yellow().to_string(),
        StageStatus::Pending => style(status.as_str()).dim().to_string(),
    }
}

pub(crate) fn stage_line(statuses: &StageStatuses) -> String {
    Stage::ALL
        .iter()
        .map(|stage| format!("{}={}", stage, styled_status(statuses.get(*stage))))
        .collect::<Vec<_>>()
        .join(" ")
}
