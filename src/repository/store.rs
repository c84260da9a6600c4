//! The persistence sink used by the pipeline.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::pool::DieselError;
use crate::models::{Document, StatusUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Database errors (locks, I/O) may clear up; missing rows will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

/// Storage for documents, their structured records and chunks.
///
/// Writes are keyed by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    async fn insert(&self, document: &Document) -> Result<(), StoreError>;

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>, StoreError>;

    /// All documents, newest first.
    async fn list(&self) -> Result<Vec<Document>, StoreError>;

    /// Apply a partial update. Fails with `NotFound` for unknown ids.
    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Upsert the structured record for `document_id` in `table_name`.
    async fn save(&self, table_name: &str, document_id: &str, data: &Value)
        -> Result<(), StoreError>;

    async fn get_record(
        &self,
        table_name: &str,
        document_id: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Replace all chunks of a document.
    async fn replace_chunks(&self, document_id: &str, chunks: &[String]) -> Result<(), StoreError>;

    async fn chunks(&self, document_id: &str) -> Result<Vec<String>, StoreError>;
}
