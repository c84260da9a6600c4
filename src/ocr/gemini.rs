//! Gemini OCR backend.
//!
//! Sends the whole PDF to a multimodal model and asks for a transcription of
//! a page range, one page per form-feed separated segment. The model reports
//! no confidence, so non-empty pages get a fixed score.

use std::sync::Arc;

use async_trait::async_trait;

use super::{OcrError, OcrPageBatch, OcrProvider, PageRange};
use crate::llm::prompts::{render, OCR_DOCUMENT_PROMPT};
use crate::llm::{LanguageModel, LlmError, ModelConfig};
use crate::pdf::PAGE_BREAK;

/// Confidence assigned to a non-empty page transcribed by the model.
const MODEL_PAGE_CONFIDENCE: f64 = 0.85;

pub struct GeminiOcr {
    model: Arc<dyn LanguageModel>,
    model_config: ModelConfig,
    pages_per_request: u32,
}

impl GeminiOcr {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        model_config: ModelConfig,
        pages_per_request: u32,
    ) -> Self {
        Self {
            model,
            model_config,
            pages_per_request: pages_per_request.max(1),
        }
    }
}

fn map_llm_error(e: LlmError) -> OcrError {
    match e {
        LlmError::NotConfigured(msg) | LlmError::Unsupported(msg) => OcrError::NotConfigured(msg),
        LlmError::Provider {
            status: Some(429),
            message,
        } => OcrError::QuotaExceeded(message),
        LlmError::Provider {
            status: Some(401 | 403),
            message,
        } => OcrError::PermissionDenied(message),
        other => OcrError::Provider(other.to_string()),
    }
}

/// Split a transcription into exactly `expected` pages.
///
/// Missing pages are empty; extra segments are folded into the last page.
pub(crate) fn split_pages(transcript: &str, expected: u32) -> Vec<String> {
    let expected = expected.max(1) as usize;
    let mut pages: Vec<String> = transcript
        .split(PAGE_BREAK)
        .map(|p| p.trim_matches('\n').to_string())
        .collect();

    if pages.len() > expected {
        let overflow = pages.split_off(expected);
        if let Some(last) = pages.last_mut() {
            for extra in overflow {
                last.push('\n');
                last.push_str(&extra);
            }
        }
    }
    pages.resize(expected, String::new());
    pages
}

#[async_trait]
impl OcrProvider for GeminiOcr {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.model.is_configured() && self.model.accepts_documents()
    }

    fn max_pages_per_request(&self) -> u32 {
        self.pages_per_request
    }

    fn retries_internally(&self) -> bool {
        true
    }

    async fn detect_document_text(
        &self,
        pdf: &[u8],
        pages: PageRange,
    ) -> Result<OcrPageBatch, OcrError> {
        let prompt = render(
            OCR_DOCUMENT_PROMPT,
            &[
                ("first", &pages.first.to_string()),
                ("last", &pages.last.to_string()),
            ],
        );
        let transcript = self
            .model
            .generate_with_document(&prompt, pdf, &self.model_config)
            .await
            .map_err(map_llm_error)?;

        let page_texts = split_pages(&transcript, pages.len());
        let confidences = page_texts
            .iter()
            .map(|t| if t.trim().is_empty() { 0.0 } else { MODEL_PAGE_CONFIDENCE })
            .collect();
        Ok(OcrPageBatch {
            page_texts,
            confidences,
        })
    }
}
