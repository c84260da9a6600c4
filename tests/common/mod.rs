//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use docpipe::config::Config;
use docpipe::extraction::{
    ExtractionContext, ExtractionMethod, ExtractionOrchestrator, ExtractionResult,
    ExtractionStrategy,
};
use docpipe::llm::{LanguageModel, LlmError, ModelConfig};
use docpipe::models::Document;
use docpipe::ocr::{OcrError, OcrPageBatch, OcrProvider, PageRange};
use docpipe::pipeline::Services;
use docpipe::registry::TypeRegistry;
use docpipe::repository::DocumentStore;
use docpipe::storage::{BlobError, BlobSource};

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Language model answering from a closure over the prompt.
pub struct FakeModel {
    respond: Box<Responder>,
    pub documents: bool,
    pub configured: bool,
    pub budget: usize,
    calls: AtomicUsize,
}

impl FakeModel {
    pub fn new(respond: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            documents: false,
            configured: true,
            budget: 50_000,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(|_| Err(LlmError::NotConfigured("no credentials".into())))
        }
    }

    pub fn with_documents(mut self) -> Self {
        self.documents = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn generate(&self, prompt: &str, _config: &ModelConfig) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(prompt)
    }

    async fn generate_with_document(
        &self,
        prompt: &str,
        _pdf: &[u8],
        _config: &ModelConfig,
    ) -> Result<String, LlmError> {
        if !self.documents {
            return Err(LlmError::Unsupported("no documents".into()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(prompt)
    }

    fn char_budget(&self) -> usize {
        self.budget
    }

    fn accepts_documents(&self) -> bool {
        self.documents
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// OCR provider returning the same text for every page.
pub struct FakeOcr {
    pub page_text: String,
    pub requests: Mutex<Vec<PageRange>>,
}

impl FakeOcr {
    pub fn new(page_text: &str) -> Self {
        Self {
            page_text: page_text.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OcrProvider for FakeOcr {
    fn name(&self) -> &'static str {
        "fake-ocr"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn max_pages_per_request(&self) -> u32 {
        2
    }

    async fn detect_document_text(
        &self,
        _pdf: &[u8],
        pages: PageRange,
    ) -> Result<OcrPageBatch, OcrError> {
        self.requests.lock().unwrap().push(pages);
        Ok(OcrPageBatch {
            page_texts: vec![self.page_text.clone(); pages.len() as usize],
            confidences: vec![0.8; pages.len() as usize],
        })
    }
}

/// In-memory blob source.
#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobs {
    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
    }
}

#[async_trait]
impl BlobSource for MemoryBlobs {
    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }
}

/// Strategy returning a fixed result.
pub struct FixedStrategy {
    pub name: &'static str,
    pub priority: u32,
    pub result: ExtractionResult,
    pub calls: AtomicUsize,
}

impl FixedStrategy {
    pub fn text(text: &str) -> Self {
        Self {
            name: "fixed-text",
            priority: 10,
            result: ExtractionResult::succeeded(
                ExtractionMethod::DirectText,
                text.to_string(),
                0.95,
                Some(1),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            name: "fixed-failure",
            priority: 10,
            result: ExtractionResult::failed(ExtractionMethod::DirectText, "not a PDF"),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for FixedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn method(&self) -> ExtractionMethod {
        self.result.method
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, ctx: &ExtractionContext) -> bool {
        !ctx.bytes.is_empty()
    }

    async fn extract(&self, _ctx: &ExtractionContext) -> ExtractionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub const INVOICE_TEXT: &str = "FACTURA Nº F-2024-001\n\
Fecha de emisión: 15/03/2024\n\
Emisor: Suministros Levante S.L. NIF B12345678\n\
Cliente: Ana Torres\n\
Base imponible 100,00 €\n\
IVA 21% 21,00 €\n\
Total factura 121,00 €\n\
Forma de pago: transferencia bancaria al IBAN indicado en el pie de página.";

pub const INVOICE_FIELDS: &str = r#"{"numero_factura": "F-2024-001", "fecha_emision": "2024-03-15",
    "emisor": "Suministros Levante S.L.", "nif_emisor": "B12345678", "receptor": "Ana Torres",
    "base_imponible": 100.0, "iva": 21.0, "total": 121.0}"#;

/// Register a document whose bytes live in `blobs` under its filename.
pub async fn register(
    store: &dyn DocumentStore,
    blobs: &MemoryBlobs,
    id: &str,
    filename: &str,
) -> Document {
    let bytes = format!("%PDF-1.4 fake content for {}", id).into_bytes();
    blobs.put(filename, bytes.clone());
    let document =
        Document::new(id.to_string(), filename.to_string(), filename.to_string(), &bytes);
    store.insert(&document).await.unwrap();
    document
}

/// Services over the given store and model, extracting with `strategies`.
pub fn services(
    store: Arc<dyn DocumentStore>,
    blobs: Arc<MemoryBlobs>,
    model: Arc<dyn LanguageModel>,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
) -> Services {
    let mut services = Services::assemble(
        store,
        blobs,
        model,
        None,
        Arc::new(TypeRegistry::built_in("integration tests")),
        &Config::default(),
    )
    .unwrap();
    services.extractor = ExtractionOrchestrator::new(strategies);
    services
}
