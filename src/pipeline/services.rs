//! Construction of the pipeline's collaborators.
//!
//! Everything is built once, from configuration, and shared through `Arc`s.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{PipelineError, PipelineOptions};
use crate::agents::{AgentRegistry, GenericMetadataAgent};
use crate::boundary::MultiDocumentBoundaryDetector;
use crate::classification::DocumentClassifier;
use crate::config::{Config, Settings};
use crate::extraction::{
    AllInOneExtractor, DirectTextExtractor, ExtractionConfig, ExtractionOrchestrator,
    ExtractionStrategy, OcrExtractor,
};
use crate::llm::{LanguageModel, LlmClient, ModelConfig};
use crate::ocr::{GeminiOcr, OcrBackendType, OcrProvider, TesseractOcr};
use crate::registry::TypeRegistry;
use crate::repository::{
    run_migrations, AsyncSqlitePool, DieselDocumentRepository, DocumentStore, StoreError,
};
use crate::storage::{BlobSource, FsBlobSource};

/// Output budget for the all-in-one call, which carries a full transcription.
const ALL_IN_ONE_MAX_TOKENS: u32 = 8192;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobSource>,
    pub model: Arc<dyn LanguageModel>,
    pub model_config: ModelConfig,
    pub types: Arc<TypeRegistry>,
    pub extractor: ExtractionOrchestrator,
    pub extraction: ExtractionConfig,
    pub classifier: Arc<DocumentClassifier>,
    pub agents: AgentRegistry,
    pub generic: Arc<GenericMetadataAgent>,
}

impl Services {
    /// Build production collaborators: SQLite store, filesystem blobs, HTTP model.
    pub async fn build(settings: &Settings, config: &Config) -> Result<Self, PipelineError> {
        settings
            .ensure_directories()
            .map_err(|e| PipelineError::Setup(format!("cannot create data directories: {}", e)))?;

        let store = open_store(settings).await?;

        let blobs: Arc<dyn BlobSource> =
            Arc::new(FsBlobSource::new(settings.documents_dir.clone()).with_retry(config.retry));
        let model: Arc<dyn LanguageModel> = Arc::new(LlmClient::new(config.llm.clone()));
        let model_config = config.llm.model_config();

        let ocr: Arc<dyn OcrProvider> = match config.ocr.backend {
            OcrBackendType::Tesseract => Arc::new(TesseractOcr::new(config.ocr.clone())),
            OcrBackendType::Gemini => Arc::new(GeminiOcr::new(
                model.clone(),
                model_config.with_timeout_ms(config.ocr.timeout_ms),
                config.ocr.pages_per_batch,
            )),
        };
        if !ocr.is_configured() {
            warn!(
                "OCR backend '{}' is not available; scanned PDFs need another strategy",
                ocr.name()
            );
        }

        let types = Arc::new(TypeRegistry::load(&settings.schema_path));
        Self::assemble(store, blobs, model, Some(ocr), types, config).map_err(PipelineError::from)
    }

    /// Wire collaborators together and validate agent dispatch against the schema.
    pub fn assemble(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobSource>,
        model: Arc<dyn LanguageModel>,
        ocr: Option<Arc<dyn OcrProvider>>,
        types: Arc<TypeRegistry>,
        config: &Config,
    ) -> Result<Self, crate::registry::RegistryError> {
        let model_config = config.llm.model_config();

        let direct_timeout = Duration::from_millis(config.extraction.direct_timeout_ms);
        let direct = DirectTextExtractor::new(direct_timeout);
        let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = vec![Arc::new(direct)];
        if let Some(ocr) = ocr {
            strategies.push(Arc::new(OcrExtractor::new(
                ocr,
                config.ocr.retry,
                Duration::from_millis(config.ocr.timeout_ms),
            )));
        }
        strategies.push(Arc::new(
            AllInOneExtractor::new(
                model.clone(),
                types.clone(),
                store.clone(),
                model_config.with_max_tokens(model_config.max_tokens.max(ALL_IN_ONE_MAX_TOKENS)),
                config.extraction.all_in_one_max_bytes,
            )
            .with_retry(config.retry),
        ));
        let extractor = ExtractionOrchestrator::new(strategies);

        let mut classifier = DocumentClassifier::new(types.clone(), config.classifier.clone());
        if model.is_configured() {
            classifier = classifier.with_model(model.clone(), model_config);
        }

        let agents = AgentRegistry::with_llm(model.clone(), model_config);
        agents.validate(&types)?;

        let generic = Arc::new(GenericMetadataAgent::new(Some(model.clone()), model_config));

        info!(
            "Pipeline ready: strategies [{}], {} document types ({})",
            extractor.strategy_names().join(", "),
            types.supported_types().len(),
            types.source()
        );

        Ok(Self {
            store,
            blobs,
            model,
            model_config,
            types,
            extractor,
            extraction: config.extraction.clone(),
            classifier: Arc::new(classifier),
            agents,
            generic,
        })
    }

    /// A boundary detector sharing this pipeline's extraction chain and model.
    pub fn boundary_detector(&self) -> MultiDocumentBoundaryDetector {
        MultiDocumentBoundaryDetector::new(
            self.extractor.clone(),
            self.extraction.clone(),
            self.model.clone(),
            self.model_config,
            self.types.clone(),
        )
    }
}

/// Open the configured SQLite store, applying pending migrations.
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let repository = match &settings.database_url {
        Some(url) => {
            let pool = AsyncSqlitePool::new(url);
            run_migrations(&pool).await?;
            DieselDocumentRepository::new(pool)
        }
        None => DieselDocumentRepository::open(&settings.database_path()).await?,
    };
    Ok(Arc::new(repository))
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            extraction: config.extraction.clone(),
            chunking: config.chunking.clone(),
            retry: config.retry,
        }
    }
}
