//! OCR extraction for scanned PDFs.
//!
//! Pages are sent in batches no larger than the provider allows; results are
//! concatenated in page order, each page preceded by a `--- Page N ---` line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{page_marker, ExtractionContext, ExtractionMethod, ExtractionResult, ExtractionStrategy};
use crate::ocr::{OcrError, OcrPageBatch, OcrProvider, PageRange};
use crate::pdf;
use crate::retry::{with_timeout, RetryPolicy};

pub struct OcrExtractor {
    provider: Arc<dyn OcrProvider>,
    retry: RetryPolicy,
    batch_timeout: Duration,
}

impl OcrExtractor {
    /// `retry` is ignored for providers that retry on their own.
    pub fn new(
        provider: Arc<dyn OcrProvider>,
        retry: RetryPolicy,
        batch_timeout: Duration,
    ) -> Self {
        let retry = if provider.retries_internally() {
            RetryPolicy::none()
        } else {
            retry
        };
        Self {
            provider,
            retry,
            batch_timeout,
        }
    }

    async fn detect_batch(&self, bytes: &[u8], range: PageRange) -> Result<OcrPageBatch, OcrError> {
        let label = format!("{} OCR pages {}-{}", self.provider.name(), range.first, range.last);
        self.retry
            .run(&label, OcrError::is_transient, || async move {
                with_timeout(self.batch_timeout, self.provider.detect_document_text(bytes, range))
                    .await
                    .map_err(|e| OcrError::Provider(e.to_string()))?
            })
            .await
    }
}

/// Join page texts with page markers, numbering from `first_page`.
pub(crate) fn join_pages(first_page: u32, pages: &[String]) -> String {
    let mut out = String::new();
    for (i, text) in pages.iter().enumerate() {
        out.push_str(&page_marker(first_page + i as u32));
        out.push('\n');
        let text = text.trim_end();
        if !text.is_empty() {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

#[async_trait]
impl ExtractionStrategy for OcrExtractor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn priority(&self) -> u32 {
        20
    }

    fn can_handle(&self, _ctx: &ExtractionContext) -> bool {
        self.provider.is_configured()
    }

    async fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let total_pages = match pdf::page_count_async(ctx.bytes.clone()).await {
            Some(n) if n > 0 => n,
            _ => ctx.estimated_pages().max(1),
        };

        let mut page_texts = Vec::with_capacity(total_pages as usize);
        let mut confidences = Vec::with_capacity(total_pages as usize);

        for range in PageRange::batches(total_pages, self.provider.max_pages_per_request()) {
            debug!("{}: OCR pages {}-{}", ctx.filename, range.first, range.last);
            match self.detect_batch(&ctx.bytes, range).await {
                Ok(mut batch) => {
                    // Keep page numbering aligned even if the provider returned a short batch.
                    batch.page_texts.resize(range.len() as usize, String::new());
                    batch.confidences.resize(range.len() as usize, 0.0);
                    page_texts.extend(batch.page_texts);
                    confidences.extend(batch.confidences);
                }
                Err(e) => {
                    return ExtractionResult {
                        page_count: Some(total_pages),
                        ..ExtractionResult::failed(
                            ExtractionMethod::Ocr,
                            format!("pages {}-{}: {}", range.first, range.last, e),
                        )
                    };
                }
            }
        }

        if page_texts.iter().all(|t| t.trim().is_empty()) {
            return ExtractionResult {
                page_count: Some(total_pages),
                ..ExtractionResult::failed(ExtractionMethod::Ocr, "OCR found no text")
            };
        }

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        ExtractionResult::succeeded(
            ExtractionMethod::Ocr,
            join_pages(1, &page_texts),
            confidence,
            Some(total_pages),
        )
    }
}
