//! In-memory `DocumentStore` for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::store::{DocumentStore, StoreError};
use crate::models::{Document, StatusUpdate};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    records: HashMap<(String, String), Value>,
    chunks: HashMap<String, Vec<String>>,
}

/// Mutex-guarded maps; locks are never held across an await.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked; the maps are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Structured records saved so far, as `(table, document_id)` keys.
    pub fn record_keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.lock().records.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.lock().documents.get(id).cloned())
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        self.lock()
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .lock()
            .documents
            .values()
            .find(|d| d.content_hash == content_hash)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.lock().documents.values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        doc.apply(update);
        Ok(())
    }

    async fn save(
        &self,
        table_name: &str,
        document_id: &str,
        data: &Value,
    ) -> Result<(), StoreError> {
        self.lock().records.insert(
            (table_name.to_string(), document_id.to_string()),
            data.clone(),
        );
        Ok(())
    }

    async fn get_record(
        &self,
        table_name: &str,
        document_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .lock()
            .records
            .get(&(table_name.to_string(), document_id.to_string()))
            .cloned())
    }

    async fn replace_chunks(&self, document_id: &str, chunks: &[String]) -> Result<(), StoreError> {
        self.lock()
            .chunks
            .insert(document_id.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn chunks(&self, document_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .chunks
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }
}
