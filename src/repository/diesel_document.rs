//! Diesel-based document repository for SQLite.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! while maintaining Diesel's compile-time query checking.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use serde_json::Value;

use super::diesel_models::{
    ChunkRow, DocumentChangeset, DocumentRecord, NewDocument, StructuredRecordRow,
};
use super::pool::{AsyncSqlitePool, DieselError};
use super::store::{DocumentStore, StoreError};
use super::{parse_datetime, run_migrations};
use crate::models::{Document, StageStatus, StageStatuses, StatusUpdate};
use crate::schema::{document_chunks, documents, structured_records};

/// Convert a database record to a domain model.
impl From<DocumentRecord> for Document {
    fn from(record: DocumentRecord) -> Self {
        let status = |s: &str| StageStatus::from_str(s).unwrap_or_default();
        Document {
            statuses: StageStatuses {
                extraction: status(&record.extraction_status),
                classification: status(&record.classification_status),
                metadata: status(&record.metadata_status),
                chunking: status(&record.chunking_status),
            },
            id: record.id,
            source_path: record.source_path,
            filename: record.filename,
            content_hash: record.content_hash,
            file_size: record.file_size.max(0) as u64,
            document_type: record.document_type,
            extracted_text: record.extracted_text,
            extraction_method: record.extraction_method,
            page_count: record.page_count.map(|p| p.max(0) as u32),
            classification_confidence: record.classification_confidence,
            classification_method: record.classification_method,
            chunk_count: record.chunk_count.map(|c| c.max(0) as u32),
            last_error: record.last_error,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

impl<'a> From<&'a StatusUpdate> for DocumentChangeset<'a> {
    fn from(update: &'a StatusUpdate) -> Self {
        DocumentChangeset {
            document_type: update.document_type.as_deref(),
            extracted_text: update.extracted_text.as_deref(),
            extraction_method: update.extraction_method.as_deref(),
            page_count: update.page_count.map(|p| p as i32),
            classification_confidence: update.classification_confidence,
            classification_method: update.classification_method.as_deref(),
            chunk_count: update.chunk_count.map(|c| c as i32),
            extraction_status: update.extraction_status.map(|s| s.as_str()),
            classification_status: update.classification_status.map(|s| s.as_str()),
            metadata_status: update.metadata_status.map(|s| s.as_str()),
            chunking_status: update.chunking_status.map(|s| s.as_str()),
            last_error: update.last_error.as_ref().map(|e| e.as_deref()),
            updated_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Diesel-based document repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselDocumentRepository {
    pool: AsyncSqlitePool,
}

impl DieselDocumentRepository {
    /// Create a new repository with an existing pool.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `db_path` and apply migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(super::pool::to_diesel_error(e)))?;
        }
        let pool = AsyncSqlitePool::from_path(db_path);
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for DieselDocumentRepository {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let mut conn = self.pool.get().await?;

        let record = documents::table
            .find(id)
            .select(DocumentRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Document::from))
    }

    async fn insert(&self, doc: &Document) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;

        let row = NewDocument {
            id: &doc.id,
            source_path: &doc.source_path,
            filename: &doc.filename,
            content_hash: &doc.content_hash,
            file_size: doc.file_size as i64,
            document_type: doc.document_type.as_deref(),
            extracted_text: doc.extracted_text.as_deref(),
            extraction_method: doc.extraction_method.as_deref(),
            page_count: doc.page_count.map(|p| p as i32),
            classification_confidence: doc.classification_confidence,
            classification_method: doc.classification_method.as_deref(),
            chunk_count: doc.chunk_count.map(|c| c as i32),
            extraction_status: doc.statuses.extraction.as_str(),
            classification_status: doc.statuses.classification.as_str(),
            metadata_status: doc.statuses.metadata.as_str(),
            chunking_status: doc.statuses.chunking.as_str(),
            last_error: doc.last_error.as_deref(),
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        };

        diesel::insert_into(documents::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>, StoreError> {
        let mut conn = self.pool.get().await?;

        let record = documents::table
            .filter(documents::content_hash.eq(content_hash))
            .select(DocumentRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Document::from))
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let mut conn = self.pool.get().await?;

        let records = documents::table
            .order(documents::created_at.desc())
            .select(DocumentRecord::as_select())
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(Document::from).collect())
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;

        if update.clear_derived {
            diesel::update(documents::table.find(id))
                .set((
                    documents::document_type.eq(None::<String>),
                    documents::extracted_text.eq(None::<String>),
                    documents::extraction_method.eq(None::<String>),
                    documents::page_count.eq(None::<i32>),
                    documents::classification_confidence.eq(None::<f64>),
                    documents::classification_method.eq(None::<String>),
                    documents::chunk_count.eq(None::<i32>),
                ))
                .execute(&mut conn)
                .await?;
        }

        let rows = diesel::update(documents::table.find(id))
            .set(DocumentChangeset::from(update))
            .execute(&mut conn)
            .await?;
        if rows == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn save(
        &self,
        table_name: &str,
        document_id: &str,
        data: &Value,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;

        let row = StructuredRecordRow {
            table_name: table_name.to_string(),
            document_id: document_id.to_string(),
            data: serde_json::to_string(data)?,
            saved_at: Utc::now().to_rfc3339(),
        };

        // Use replace_into for SQLite upsert
        diesel::replace_into(structured_records::table)
            .values(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_record(
        &self,
        table_name: &str,
        document_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let mut conn = self.pool.get().await?;

        let row = structured_records::table
            .find((table_name, document_id))
            .select(StructuredRecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(|r| serde_json::from_str(&r.data))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn replace_chunks(&self, document_id: &str, chunks: &[String]) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<ChunkRow> = chunks
            .iter()
            .enumerate()
            .map(|(i, content)| ChunkRow {
                document_id: document_id.to_string(),
                chunk_index: i as i32,
                content: content.clone(),
                char_count: content.chars().count() as i32,
            })
            .collect();

        conn.batch_execute("BEGIN IMMEDIATE").await?;
        let result: Result<(), DieselError> = async {
            diesel::delete(
                document_chunks::table.filter(document_chunks::document_id.eq(document_id)),
            )
            .execute(&mut conn)
            .await?;
            for row in &rows {
                diesel::insert_into(document_chunks::table)
                    .values(row)
                    .execute(&mut conn)
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.batch_execute("COMMIT").await?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.batch_execute("ROLLBACK").await;
                Err(e.into())
            }
        }
    }

    async fn chunks(&self, document_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;

        let contents = document_chunks::table
            .filter(document_chunks::document_id.eq(document_id))
            .order(document_chunks::chunk_index.asc())
            .select(document_chunks::content)
            .load::<String>(&mut conn)
            .await?;
        Ok(contents)
    }
}
