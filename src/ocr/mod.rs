//! OCR providers for scanned PDFs.
//!
//! Providers work on page ranges of a whole PDF and report per-page text and
//! confidence. Batching across provider page limits is done by the caller.
//!
//! Backends:
//! - Tesseract: pdftoppm + tesseract TSV output (local)
//! - Gemini: multimodal model reading the PDF directly (requires API key)

mod gemini;
mod tesseract;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub use gemini::GeminiOcr;
pub use tesseract::TesseractOcr;

/// Errors from OCR providers.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("OCR permission denied: {0}")]
    PermissionDenied(String),

    #[error("OCR provider error: {0}")]
    Provider(String),

    #[error("OCR provider not configured: {0}")]
    NotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_) | Self::Provider(_))
    }
}

/// Inclusive, 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn new(first: u32, last: u32) -> Self {
        let first = first.max(1);
        Self {
            first,
            last: last.max(first),
        }
    }

    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Split `1..=total` into consecutive ranges of at most `batch` pages.
    pub fn batches(total: u32, batch: u32) -> Vec<PageRange> {
        let batch = batch.max(1);
        (0..total.div_ceil(batch))
            .map(|i| {
                let first = i * batch + 1;
                PageRange::new(first, (first + batch - 1).min(total))
            })
            .collect()
    }
}

/// Text and confidence for each page of one range, in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPageBatch {
    pub page_texts: Vec<String>,
    /// Per-page confidence, 0.0 - 1.0.
    pub confidences: Vec<f64>,
}

/// A provider that can read text out of PDF pages.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Provider identifier for logs.
    fn name(&self) -> &'static str;

    /// Whether credentials/tools needed by this provider are present.
    fn is_configured(&self) -> bool;

    /// Largest page range one request may cover.
    fn max_pages_per_request(&self) -> u32;

    /// The provider already retries transient failures itself.
    fn retries_internally(&self) -> bool {
        false
    }

    /// Detect text on `pages` of the given PDF.
    async fn detect_document_text(
        &self,
        pdf: &[u8],
        pages: PageRange,
    ) -> Result<OcrPageBatch, OcrError>;
}

/// OCR backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendType {
    #[default]
    Tesseract,
    Gemini,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "gemini" => Some(OcrBackendType::Gemini),
            _ => None,
        }
    }
}

/// OCR configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub backend: OcrBackendType,
    /// Tesseract language code(s), e.g. "spa+eng".
    #[serde(default = "default_language")]
    pub language: String,
    /// Pages per provider request.
    #[serde(default = "default_pages_per_batch")]
    pub pages_per_batch: u32,
    /// Render resolution for image-based backends.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Timeout per batch in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_language() -> String {
    "spa+eng".to_string()
}

fn default_pages_per_batch() -> u32 {
    5
}

fn default_dpi() -> u32 {
    300
}

fn default_timeout_ms() -> u64 {
    180_000
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendType::default(),
            language: default_language(),
            pages_per_batch: default_pages_per_batch(),
            dpi: default_dpi(),
            timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_cover_all_pages_in_order() {
        let batches = PageRange::batches(12, 5);
        assert_eq!(
            batches,
            vec![
                PageRange::new(1, 5),
                PageRange::new(6, 10),
                PageRange::new(11, 12)
            ]
        );
        assert_eq!(batches.iter().map(|b| b.len()).sum::<u32>(), 12);
    }

    #[test]
    fn test_batches_empty_document() {
        assert!(PageRange::batches(0, 5).is_empty());
    }

    #[test]
    fn test_transient_errors() {
        assert!(OcrError::Provider("503".into()).is_transient());
        assert!(OcrError::QuotaExceeded("429".into()).is_transient());
        assert!(!OcrError::PermissionDenied("403".into()).is_transient());
        assert!(!OcrError::NotConfigured("key".into()).is_transient());
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!(OcrBackendType::from_str("Gemini"), Some(OcrBackendType::Gemini));
        assert_eq!(OcrBackendType::from_str("paddle"), None);
    }
}
