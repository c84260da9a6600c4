//! Per-document processing pipeline.
//!
//! Four stages run strictly in order: extraction, classification, metadata,
//! chunking. Each stage moves its own status `pending -> processing ->
//! completed | failed` and persists its output before the next one starts,
//! so an interrupted run can resume and completed stages are skipped.

mod chunking;
mod services;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::{validate_required, AgentError, MetadataOutcome, ValidationError};
use crate::extraction::{ExtractionConfig, ExtractionContext};
use crate::models::{Document, ProcessingLevel, Stage, StageStatus, StatusUpdate};
use crate::registry::RegistryError;
use crate::repository::StoreError;
use crate::retry::RetryPolicy;
use crate::storage::BlobError;

pub use chunking::{chunk_text, ChunkingConfig};
pub use services::{open_store, Services};

/// Storage target for metadata of types without a dedicated agent.
pub const GENERIC_METADATA_TABLE: &str = "generic_metadata";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("illegal {stage} status change: {from} -> {to}")]
    IllegalTransition {
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("setup failed: {0}")]
    Setup(String),
}

/// Why a stage did not complete.
#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Missing(String),
}

/// Result of one `process_document` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub document_id: String,
    /// Set when a strategy finished the whole pipeline on its own.
    pub completed_by: Option<String>,
    /// Stages that actually ran (skipped ones are not listed).
    pub stages_run: Vec<Stage>,
}

/// Knobs the pipeline needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub extraction: ExtractionConfig,
    pub chunking: ChunkingConfig,
    /// Retries for store calls and malformed agent replies.
    pub retry: RetryPolicy,
}

/// How a stage finished.
enum StageOutcome {
    Continue(StatusUpdate),
    /// All stages done; carries the strategy name.
    Complete(StatusUpdate, String),
}

pub struct PipelineOrchestrator {
    services: Services,
    options: PipelineOptions,
}

impl PipelineOrchestrator {
    pub fn new(services: Services, options: PipelineOptions) -> Self {
        Self { services, options }
    }

    /// Run stages up to `level`, skipping those already completed.
    pub async fn process_document(
        &self,
        document_id: &str,
        level: ProcessingLevel,
    ) -> Result<ProcessOutcome, PipelineError> {
        let mut document = self.load(document_id).await?;
        let mut outcome = ProcessOutcome {
            success: false,
            document_id: document_id.to_string(),
            completed_by: None,
            stages_run: Vec::new(),
        };

        for stage in Stage::ALL {
            if !level.includes(stage) {
                break;
            }
            match document.status(stage) {
                StageStatus::Completed => {
                    debug!("{}: {} already completed, skipping", document_id, stage);
                    continue;
                }
                StageStatus::Processing => {
                    warn!("{}: {} was left processing, restarting it", document_id, stage);
                    self.write(
                        &mut document,
                        StatusUpdate::new()
                            .stage(stage, StageStatus::Failed)
                            .error("abandoned by an earlier run"),
                    )
                    .await?;
                }
                StageStatus::Pending | StageStatus::Failed => {}
            }

            self.write(&mut document, StatusUpdate::new().stage(stage, StageStatus::Processing))
                .await?;
            info!("{}: {} started", document_id, stage);
            outcome.stages_run.push(stage);

            let result = match stage {
                Stage::Extraction => self.run_extraction(&document).await,
                Stage::Classification => self
                    .run_classification(&document)
                    .await
                    .map(StageOutcome::Continue),
                Stage::Metadata => self.run_metadata(&document).await.map(StageOutcome::Continue),
                Stage::Chunking => self.run_chunking(&document).await.map(StageOutcome::Continue),
            };

            match result {
                Ok(StageOutcome::Continue(mut update)) => {
                    if document.last_error.is_some() {
                        update.last_error = Some(None);
                    }
                    self.write(&mut document, update.stage(stage, StageStatus::Completed))
                        .await?;
                    info!("{}: {} completed", document_id, stage);
                }
                Ok(StageOutcome::Complete(mut update, strategy)) => {
                    for stage in Stage::ALL {
                        if document.status(stage).can_transition_to(StageStatus::Completed) {
                            update = update.stage(stage, StageStatus::Completed);
                        }
                    }
                    self.write(&mut document, update).await?;
                    info!("{}: {} completed every stage", document_id, strategy);
                    outcome.completed_by = Some(strategy);
                    break;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("{}: {} failed: {}", document_id, stage, message);
                    self.write(
                        &mut document,
                        StatusUpdate::new()
                            .stage(stage, StageStatus::Failed)
                            .error(message.clone()),
                    )
                    .await?;
                    return Err(PipelineError::StageFailed { stage, message });
                }
            }
        }

        outcome.success = true;
        Ok(outcome)
    }

    /// Reset every stage and derived field, then process from scratch.
    pub async fn reprocess(
        &self,
        document_id: &str,
        level: ProcessingLevel,
    ) -> Result<ProcessOutcome, PipelineError> {
        let mut document = self.load(document_id).await?;
        self.write(&mut document, StatusUpdate::reset_all()).await?;
        self.retrying("clear chunks", || self.services.store.replace_chunks(document_id, &[]))
            .await?;
        info!("{}: reset for reprocessing", document_id);
        self.process_document(document_id, level).await
    }

    async fn load(&self, document_id: &str) -> Result<Document, PipelineError> {
        self.retrying("load document", || self.services.store.get(document_id))
            .await?
            .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))
    }

    /// Persist an update and mirror it on the in-memory document.
    ///
    /// Stage statuses only move forward; a reset is the one exception.
    async fn write(
        &self,
        document: &mut Document,
        update: StatusUpdate,
    ) -> Result<(), PipelineError> {
        if !update.clear_derived {
            check_transitions(document, &update)?;
        }
        let id = document.id.clone();
        self.retrying("update status", || self.services.store.update_status(&id, &update))
            .await?;
        document.apply(&update);
        Ok(())
    }

    async fn retrying<T, F, Fut>(&self, label: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        self.options.retry.run(label, StoreError::is_transient, op).await
    }

    async fn run_extraction(&self, document: &Document) -> Result<StageOutcome, StageError> {
        let bytes = self.services.blobs.download(&document.source_path).await?;
        let ctx = ExtractionContext::new(bytes, document.filename.clone())
            .with_config(&self.options.extraction)
            .with_document_id(document.id.clone());

        let result = self.services.extractor.extract(&ctx).await;
        if !result.success {
            return Err(StageError::Extraction(format!(
                "{} ({})",
                result.error.as_deref().unwrap_or("no text"),
                result.method
            )));
        }

        let update = StatusUpdate {
            extracted_text: result.text.clone(),
            extraction_method: Some(result.method.to_string()),
            page_count: result.page_count,
            last_error: Some(None),
            ..StatusUpdate::new()
        };

        Ok(match result.all_in_one {
            Some(all_in_one) => StageOutcome::Complete(
                StatusUpdate {
                    document_type: Some(all_in_one.document_type),
                    classification_confidence: Some(all_in_one.confidence),
                    classification_method: Some(result.method.to_string()),
                    ..update
                },
                result.method.to_string(),
            ),
            None => StageOutcome::Continue(update),
        })
    }

    async fn run_classification(&self, document: &Document) -> Result<StatusUpdate, StageError> {
        let result = self
            .services
            .classifier
            .classify(&document.filename, document.extracted_text.as_deref(), true)
            .await;
        info!(
            "{}: classified as {} ({:.2} via {}{})",
            document.id,
            result.document_type,
            result.confidence,
            result.method,
            if result.fallback_used { ", fallback" } else { "" }
        );
        Ok(StatusUpdate {
            document_type: Some(result.document_type),
            classification_confidence: Some(result.confidence),
            classification_method: Some(result.method.to_string()),
            ..StatusUpdate::new()
        })
    }

    async fn run_metadata(&self, document: &Document) -> Result<StatusUpdate, StageError> {
        let text = document
            .extracted_text
            .as_deref()
            .ok_or_else(|| StageError::Missing("no extracted text".to_string()))?;
        let type_name = document.document_type.as_deref().unwrap_or_default();

        let (table, data) = match self.services.types.get_config(type_name) {
            Some(config) => {
                let agent = self.services.agents.agent_for(config).ok_or_else(|| {
                    StageError::Missing(format!("no agent registered for {}", config.agent_name))
                })?;
                let data = self
                    .options
                    .retry
                    .run("metadata agent", AgentError::is_transient, || {
                        agent.extract(text, config)
                    })
                    .await?;
                validate_required(&data, &config.required_fields)?;
                (config.table_name.clone(), data)
            }
            None => {
                debug!(
                    "{}: '{}' has no dedicated agent, using generic metadata",
                    document.id, type_name
                );
                let outcome = self.services.generic.extract(text).await;
                if outcome.is_degraded() {
                    warn!("{}: generic metadata is a heuristic fallback", document.id);
                }
                (GENERIC_METADATA_TABLE.to_string(), generic_record(type_name, outcome))
            }
        };

        let id = document.id.as_str();
        self.retrying("save structured record", || self.services.store.save(&table, id, &data))
            .await?;
        info!("{}: metadata saved to {}", document.id, table);
        Ok(StatusUpdate::new())
    }

    async fn run_chunking(&self, document: &Document) -> Result<StatusUpdate, StageError> {
        let text = document.extracted_text.as_deref().unwrap_or_default();
        let chunks = chunk_text(text, self.options.chunking.max_chunk_chars);
        let id = document.id.as_str();
        self.retrying("replace chunks", || self.services.store.replace_chunks(id, &chunks))
            .await?;
        Ok(StatusUpdate {
            chunk_count: Some(chunks.len() as u32),
            ..StatusUpdate::new()
        })
    }
}

fn check_transitions(document: &Document, update: &StatusUpdate) -> Result<(), PipelineError> {
    for (stage, to) in update.stage_statuses() {
        let from = document.status(stage);
        if !from.can_transition_to(to) {
            return Err(PipelineError::IllegalTransition { stage, from, to });
        }
    }
    Ok(())
}

/// Record stored for documents handled by the generic agent.
fn generic_record(document_type: &str, outcome: MetadataOutcome) -> Value {
    let (data, degraded_reason) = match outcome {
        MetadataOutcome::Extracted(data) => (data, None),
        MetadataOutcome::Degraded { data, reason } => (data, Some(reason)),
    };
    json!({
        "document_type": document_type,
        "degraded": degraded_reason.is_some(),
        "degraded_reason": degraded_reason,
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_with(stage: Stage, status: StageStatus) -> Document {
        let mut document = Document::new("doc-1".into(), "a.pdf".into(), "a.pdf".into(), b"%PDF");
        document.apply(&StatusUpdate::new().stage(stage, status));
        document
    }

    #[test]
    fn test_completed_stage_cannot_restart() {
        let document = document_with(Stage::Metadata, StageStatus::Completed);
        let update = StatusUpdate::new().stage(Stage::Metadata, StageStatus::Processing);
        let err = check_transitions(&document, &update).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IllegalTransition {
                stage: Stage::Metadata,
                from: StageStatus::Completed,
                to: StageStatus::Processing,
            }
        ));
    }

    #[test]
    fn test_processing_stage_cannot_be_entered_twice() {
        let document = document_with(Stage::Extraction, StageStatus::Processing);
        let update = StatusUpdate::new().stage(Stage::Extraction, StageStatus::Processing);
        assert!(check_transitions(&document, &update).is_err());

        let update = StatusUpdate::new().stage(Stage::Extraction, StageStatus::Failed);
        assert!(check_transitions(&document, &update).is_ok());
    }

    #[test]
    fn test_generic_record_marks_degraded() {
        let record = generic_record(
            "carta",
            MetadataOutcome::Degraded {
                data: json!({"title": "Hola"}),
                reason: "offline".into(),
            },
        );
        assert_eq!(record["degraded"], true);
        assert_eq!(record["degraded_reason"], "offline");
        assert_eq!(record["data"]["title"], "Hola");

        let record = generic_record("carta", MetadataOutcome::Extracted(json!({})));
        assert_eq!(record["degraded"], false);
        assert!(record["degraded_reason"].is_null());
    }
}
