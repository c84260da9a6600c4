//! Document model tracked through the processing pipeline.
//!
//! A document is created when a PDF is registered and is then mutated once
//! per stage by each pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::stage::{Stage, StageStatus, StageStatuses};

/// A registered source document and everything the pipeline derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this document.
    pub id: String,
    /// Reference to the raw bytes, relative to the blob source root.
    pub source_path: String,
    /// Original filename (used by the filename classification tier).
    pub filename: String,
    /// SHA-256 of the raw bytes.
    pub content_hash: String,
    /// Size of the raw bytes.
    pub file_size: u64,
    /// Document type set by classification.
    pub document_type: Option<String>,
    /// Extracted text content.
    pub extracted_text: Option<String>,
    /// Identifier of the extraction method that produced `extracted_text`.
    pub extraction_method: Option<String>,
    /// Page count reported by extraction.
    pub page_count: Option<u32>,
    /// Confidence of the classification that set `document_type`.
    pub classification_confidence: Option<f64>,
    /// Tier that produced the classification.
    pub classification_method: Option<String>,
    /// Number of chunks written by the chunking stage.
    pub chunk_count: Option<u32>,
    /// Per-stage progress.
    pub statuses: StageStatuses,
    /// Last stage error, if any.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Compute SHA-256 hash of content.
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// Create a new document with all stages pending.
    pub fn new(id: String, source_path: String, filename: String, content: &[u8]) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_path,
            filename,
            content_hash: Self::compute_hash(content),
            file_size: content.len() as u64,
            document_type: None,
            extracted_text: None,
            extraction_method: None,
            page_count: None,
            classification_confidence: None,
            classification_method: None,
            chunk_count: None,
            statuses: StageStatuses::default(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.statuses.get(stage)
    }

    /// Apply a status update in memory, mirroring what the store persists.
    pub fn apply(&mut self, update: &StatusUpdate) {
        if update.clear_derived {
            self.document_type = None;
            self.extracted_text = None;
            self.extraction_method = None;
            self.page_count = None;
            self.classification_confidence = None;
            self.classification_method = None;
            self.chunk_count = None;
        }
        for (stage, status) in update.stage_statuses() {
            self.statuses.set(stage, status);
        }
        if let Some(ref t) = update.document_type {
            self.document_type = Some(t.clone());
        }
        if let Some(ref t) = update.extracted_text {
            self.extracted_text = Some(t.clone());
        }
        if let Some(ref m) = update.extraction_method {
            self.extraction_method = Some(m.clone());
        }
        if let Some(p) = update.page_count {
            self.page_count = Some(p);
        }
        if let Some(c) = update.classification_confidence {
            self.classification_confidence = Some(c);
        }
        if let Some(ref m) = update.classification_method {
            self.classification_method = Some(m.clone());
        }
        if let Some(c) = update.chunk_count {
            self.chunk_count = Some(c);
        }
        if let Some(ref e) = update.last_error {
            self.last_error = e.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// A partial update of a document's stage statuses and derived fields.
///
/// `None` fields are left untouched. `last_error: Some(None)` clears the error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub extraction_status: Option<StageStatus>,
    pub classification_status: Option<StageStatus>,
    pub metadata_status: Option<StageStatus>,
    pub chunking_status: Option<StageStatus>,
    pub document_type: Option<String>,
    pub extracted_text: Option<String>,
    pub extraction_method: Option<String>,
    pub page_count: Option<u32>,
    pub classification_confidence: Option<f64>,
    pub classification_method: Option<String>,
    pub chunk_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    /// Clear every derived field before applying the rest (reprocess).
    pub clear_derived: bool,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one stage's status.
    pub fn stage(mut self, stage: Stage, status: StageStatus) -> Self {
        let slot = match stage {
            Stage::Extraction => &mut self.extraction_status,
            Stage::Classification => &mut self.classification_status,
            Stage::Metadata => &mut self.metadata_status,
            Stage::Chunking => &mut self.chunking_status,
        };
        *slot = Some(status);
        self
    }

    /// Reset every stage to pending and clear derived fields and the last error (reprocess).
    pub fn reset_all() -> Self {
        let mut update = Self {
            clear_derived: true,
            ..Self::new()
        };
        for stage in Stage::ALL {
            update = update.stage(stage, StageStatus::Pending);
        }
        update.last_error = Some(None);
        update
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    /// The stage statuses carried by this update.
    pub fn stage_statuses(&self) -> Vec<(Stage, StageStatus)> {
        [
            (Stage::Extraction, self.extraction_status),
            (Stage::Classification, self.classification_status),
            (Stage::Metadata, self.metadata_status),
            (Stage::Chunking, self.chunking_status),
        ]
        .into_iter()
        .filter_map(|(stage, status)| status.map(|s| (stage, s)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let hash = Document::compute_hash(b"Hello, World!");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new(
            "doc1".to_string(),
            "inbox/factura.pdf".to_string(),
            "factura.pdf".to_string(),
            b"%PDF-1.4",
        );
        for stage in Stage::ALL {
            assert_eq!(doc.status(stage), StageStatus::Pending);
        }
        assert_eq!(doc.file_size, 8);
    }

    #[test]
    fn test_apply_update() {
        let mut doc = Document::new(
            "doc1".to_string(),
            "a.pdf".to_string(),
            "a.pdf".to_string(),
            b"x",
        );
        let update = StatusUpdate::new()
            .stage(Stage::Classification, StageStatus::Completed)
            .error("boom");
        doc.apply(&StatusUpdate {
            document_type: Some("factura".to_string()),
            ..update
        });
        assert_eq!(doc.status(Stage::Classification), StageStatus::Completed);
        assert_eq!(doc.document_type.as_deref(), Some("factura"));
        assert_eq!(doc.last_error.as_deref(), Some("boom"));

        doc.apply(&StatusUpdate::reset_all());
        assert_eq!(doc.status(Stage::Classification), StageStatus::Pending);
        assert!(doc.last_error.is_none());
    }

    #[test]
    fn test_empty_update() {
        assert!(StatusUpdate::new().is_empty());
        assert!(!StatusUpdate::new()
            .stage(Stage::Chunking, StageStatus::Processing)
            .is_empty());
    }
}
