//! Single multimodal call that transcribes, classifies and extracts fields.
//!
//! Only attempted for small documents: the orchestrator applies the page
//! limit before this strategy runs, and `can_handle` enforces a byte
//! ceiling. When the call yields a supported type with every required field,
//! the structured record is saved here and the result tells the pipeline to
//! skip the remaining stages. Anything less returns plain text so the normal
//! stages take over.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    AllInOneOutcome, ExtractionContext, ExtractionMethod, ExtractionResult, ExtractionStrategy,
};
use crate::agents::{validate_required, AgentKind};
use crate::classification::canonical_type;
use crate::llm::prompts::{render, ALL_IN_ONE_PROMPT};
use crate::llm::{extract_json_object, LanguageModel, ModelConfig};
use crate::registry::TypeRegistry;
use crate::repository::{DocumentStore, StoreError};
use crate::retry::RetryPolicy;

/// Confidence required before the structured result is trusted.
const MIN_CLASSIFICATION_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct AllInOneResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default, rename = "type")]
    document_type: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    fields: Option<Value>,
}

pub struct AllInOneExtractor {
    model: Arc<dyn LanguageModel>,
    types: Arc<TypeRegistry>,
    store: Arc<dyn DocumentStore>,
    model_config: ModelConfig,
    max_bytes: usize,
    retry: RetryPolicy,
}

impl AllInOneExtractor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        types: Arc<TypeRegistry>,
        store: Arc<dyn DocumentStore>,
        model_config: ModelConfig,
        max_bytes: usize,
    ) -> Self {
        Self {
            model,
            types,
            store,
            model_config,
            max_bytes,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn fields_by_type(&self) -> String {
        self.types
            .configs()
            .map(|config| {
                let fields = AgentKind::from_str(&config.agent_name)
                    .map(|kind| kind.field_names(config))
                    .unwrap_or_else(|| config.required_fields.clone());
                format!("- {}: {}", config.type_name, fields.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Save the structured record when the response fully describes a known type.
    async fn try_complete(
        &self,
        ctx: &ExtractionContext,
        response: &AllInOneResponse,
    ) -> Option<AllInOneOutcome> {
        let document_id = ctx.document_id.as_deref()?;
        let raw_type = response.document_type.as_deref()?;
        let config = self.types.get_config(&canonical_type(raw_type))?;
        let confidence = response.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
        if confidence < MIN_CLASSIFICATION_CONFIDENCE {
            debug!(
                "{}: all-in-one confidence {:.2} too low to skip stages",
                ctx.filename, confidence
            );
            return None;
        }

        let fields = response.fields.as_ref().filter(|f| f.is_object())?;
        if let Err(e) = validate_required(fields, &config.required_fields) {
            debug!("{}: all-in-one result incomplete: {}", ctx.filename, e);
            return None;
        }

        let label = format!("save {} record for {}", config.table_name, document_id);
        let saved = self
            .retry
            .run(&label, StoreError::is_transient, || {
                self.store.save(&config.table_name, document_id, fields)
            })
            .await;
        if let Err(e) = saved {
            warn!("{}: could not save all-in-one record: {}", ctx.filename, e);
            return None;
        }

        info!(
            "{}: all-in-one classified as {} ({:.2}) and saved to {}",
            ctx.filename, config.type_name, confidence, config.table_name
        );
        Some(AllInOneOutcome {
            document_type: config.type_name.clone(),
            confidence,
            table_name: config.table_name.clone(),
        })
    }
}

#[async_trait]
impl ExtractionStrategy for AllInOneExtractor {
    fn name(&self) -> &'static str {
        "all-in-one"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::AllInOne
    }

    fn priority(&self) -> u32 {
        30
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn can_handle(&self, ctx: &ExtractionContext) -> bool {
        self.model.is_configured()
            && self.model.accepts_documents()
            && !ctx.bytes.is_empty()
            && ctx.bytes.len() <= self.max_bytes
    }

    async fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let types = self.types.supported_types().join(", ");
        let prompt = render(
            ALL_IN_ONE_PROMPT,
            &[("types", &types), ("fields", &self.fields_by_type())],
        );

        let reply = match self
            .model
            .generate_with_document(&prompt, &ctx.bytes, &self.model_config)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return ExtractionResult::failed(ExtractionMethod::AllInOne, e.to_string()),
        };

        let response: AllInOneResponse = match extract_json_object(&reply)
            .map(serde_json::from_value)
        {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                return ExtractionResult::failed(
                    ExtractionMethod::AllInOne,
                    format!("unexpected response shape: {}", e),
                )
            }
            None => {
                return ExtractionResult::failed(ExtractionMethod::AllInOne, "response was not JSON")
            }
        };

        let confidence = response.confidence.unwrap_or(0.5);
        let result = ExtractionResult::succeeded(
            ExtractionMethod::AllInOne,
            response.text.clone(),
            confidence,
            response.page_count.or(Some(ctx.estimated_pages().max(1))),
        );
        if !result.success {
            return result;
        }

        match self.try_complete(ctx, &response).await {
            Some(outcome) => result.with_all_in_one(outcome),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::repository::MemoryDocumentStore;

    const COMPLETE: &str = r#"{"text": "FACTURA F-7\nTotal 121,00 EUR", "page_count": 1,
        "type": "factura", "confidence": 0.92,
        "fields": {"numero_factura": "F-7", "fecha_emision": "2024-02-01", "emisor": "ACME",
                   "total": 121.0}}"#;

    fn extractor(model: ScriptedModel, store: Arc<MemoryDocumentStore>) -> AllInOneExtractor {
        AllInOneExtractor::new(
            Arc::new(model),
            Arc::new(TypeRegistry::built_in("test")),
            store,
            ModelConfig::new(0.1, 1024, 1_000),
            5 * super::super::BYTES_PER_PAGE_ESTIMATE,
        )
        .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_complete_result_is_saved_and_short_circuits() {
        let store = Arc::new(MemoryDocumentStore::new());
        let strategy = extractor(ScriptedModel::replying(COMPLETE).with_documents(), store.clone());
        let ctx = ExtractionContext::new(vec![1u8; 1000], "f.pdf").with_document_id("doc-1");

        let result = strategy.extract(&ctx).await;
        assert!(result.completes_pipeline());
        let outcome = result.all_in_one.unwrap();
        assert_eq!(outcome.document_type, "factura");
        let record = store.get_record(&outcome.table_name, "doc-1").await.unwrap().unwrap();
        assert_eq!(record["numero_factura"], "F-7");
    }

    #[tokio::test]
    async fn test_translated_type_label_is_saved_under_canonical_type() {
        let reply = COMPLETE.replace(r#""type": "factura""#, r#""type": "Invoice""#);
        let store = Arc::new(MemoryDocumentStore::new());
        let strategy = extractor(ScriptedModel::replying(&reply).with_documents(), store.clone());
        let ctx = ExtractionContext::new(vec![1u8; 1000], "f.pdf").with_document_id("doc-1");

        let result = strategy.extract(&ctx).await;
        assert!(result.completes_pipeline());
        assert_eq!(result.all_in_one.unwrap().document_type, "factura");
        assert!(store.get_record("facturas", "doc-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_required_fields_returns_text_only() {
        let reply = r#"{"text": "FACTURA sin datos", "type": "factura", "confidence": 0.9,
            "fields": {"total": null}}"#;
        let store = Arc::new(MemoryDocumentStore::new());
        let strategy = extractor(ScriptedModel::replying(reply).with_documents(), store.clone());
        let ctx = ExtractionContext::new(vec![1u8; 10], "f.pdf").with_document_id("doc-1");

        let result = strategy.extract(&ctx).await;
        assert!(result.success);
        assert!(!result.completes_pipeline());
        assert!(store.record_keys().is_empty());
    }

    #[tokio::test]
    async fn test_without_document_id_nothing_is_persisted() {
        let store = Arc::new(MemoryDocumentStore::new());
        let strategy = extractor(ScriptedModel::replying(COMPLETE).with_documents(), store.clone());
        let result = strategy.extract(&ExtractionContext::new(vec![1u8; 10], "f.pdf")).await;
        assert!(result.success && !result.completes_pipeline());
        assert!(store.record_keys().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_reply_fails() {
        let store = Arc::new(MemoryDocumentStore::new());
        let strategy = extractor(ScriptedModel::replying("sorry").with_documents(), store);
        let result = strategy.extract(&ExtractionContext::new(vec![1u8; 10], "f.pdf")).await;
        assert!(!result.success);
        assert_eq!(result.method, ExtractionMethod::AllInOne);
    }

    #[test]
    fn test_can_handle_needs_multimodal_model_and_small_input() {
        let store = Arc::new(MemoryDocumentStore::new());
        let text_only = extractor(ScriptedModel::replying(COMPLETE), store.clone());
        assert!(!text_only.can_handle(&ExtractionContext::new(vec![1u8; 10], "f.pdf")));

        let strategy = extractor(ScriptedModel::replying(COMPLETE).with_documents(), store);
        assert!(strategy.can_handle(&ExtractionContext::new(vec![1u8; 10], "f.pdf")));
        assert!(!strategy.can_handle(&ExtractionContext::new(
            vec![1u8; 6 * super::super::BYTES_PER_PAGE_ESTIMATE],
            "f.pdf"
        )));
    }
}
