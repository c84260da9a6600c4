//! Text extraction: a priority-ordered chain of strategies.
//!
//! Strategies are tried cheapest first. The chain stops at the first result
//! that meets the sufficiency predicate, or at an all-in-one result that
//! already classified and persisted the document. Strategy failures are data;
//! [`ExtractionOrchestrator::extract`] never returns an error.

mod all_in_one;
mod direct;
mod ocr;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use all_in_one::AllInOneExtractor;
pub use direct::DirectTextExtractor;
pub use ocr::OcrExtractor;
pub(crate) use ocr::join_pages;

/// Page-count heuristic: roughly one page per megabyte.
pub const BYTES_PER_PAGE_ESTIMATE: usize = 1024 * 1024;

/// Line prefix the OCR strategy puts before each page.
pub const PAGE_MARKER_PREFIX: &str = "--- Page ";

/// Format a page marker line (without newline).
pub fn page_marker(page: u32) -> String {
    format!("{}{} ---", PAGE_MARKER_PREFIX, page)
}

pub(crate) fn is_page_marker(line: &str) -> bool {
    let line = line.trim();
    line.starts_with(PAGE_MARKER_PREFIX) && line.ends_with("---")
}

/// Extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum characters for a result to count as sufficient.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    /// Estimated pages above which the expensive strategy is not attempted.
    #[serde(default = "default_max_pages")]
    pub max_pages_for_expensive: u32,
    /// Byte ceiling for the all-in-one strategy.
    #[serde(default = "default_all_in_one_max_bytes")]
    pub all_in_one_max_bytes: usize,
    /// Hard limit for the out-of-process text extractor.
    #[serde(default = "default_direct_timeout_ms")]
    pub direct_timeout_ms: u64,
}

fn default_min_text_length() -> usize {
    50
}

fn default_max_pages() -> u32 {
    5
}

fn default_all_in_one_max_bytes() -> usize {
    5 * BYTES_PER_PAGE_ESTIMATE
}

fn default_direct_timeout_ms() -> u64 {
    60_000
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_length: default_min_text_length(),
            max_pages_for_expensive: default_max_pages(),
            all_in_one_max_bytes: default_all_in_one_max_bytes(),
            direct_timeout_ms: default_direct_timeout_ms(),
        }
    }
}

/// Immutable input for one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub bytes: Arc<[u8]>,
    pub filename: String,
    /// Set when the bytes belong to a stored document; strategies that
    /// persist results need it.
    pub document_id: Option<String>,
    pub min_text_length: usize,
    /// Page limit for expensive strategies.
    pub max_pages: u32,
}

impl ExtractionContext {
    pub fn new(bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            document_id: None,
            min_text_length: default_min_text_length(),
            max_pages: default_max_pages(),
        }
    }

    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: &ExtractionConfig) -> Self {
        self.min_text_length = config.min_text_length;
        self.max_pages = config.max_pages_for_expensive;
        self
    }

    /// Page estimate from the buffer size.
    pub fn estimated_pages(&self) -> u32 {
        self.bytes.len().div_ceil(BYTES_PER_PAGE_ESTIMATE) as u32
    }
}

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    DirectText,
    Ocr,
    AllInOne,
    /// Sentinel: the document is too large for automatic extraction.
    #[serde(rename = "manual-review-required")]
    ManualReview,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectText => "direct-text",
            Self::Ocr => "ocr",
            Self::AllInOne => "all-in-one",
            Self::ManualReview => "manual-review-required",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an all-in-one strategy completed besides extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct AllInOneOutcome {
    pub document_type: String,
    pub confidence: f64,
    pub table_name: String,
}

/// Outcome of one strategy attempt.
///
/// `success` implies `text` is present and non-empty; the constructors
/// enforce this.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub text: Option<String>,
    /// 0.0 - 1.0, strategy-specific.
    pub confidence: f64,
    pub page_count: Option<u32>,
    pub method: ExtractionMethod,
    pub error: Option<String>,
    /// Set when the strategy also classified and persisted the document.
    pub all_in_one: Option<AllInOneOutcome>,
}

impl ExtractionResult {
    /// A successful result; empty text turns it into a failure.
    pub fn succeeded(
        method: ExtractionMethod,
        text: String,
        confidence: f64,
        page_count: Option<u32>,
    ) -> Self {
        if text.trim().is_empty() {
            return Self {
                page_count,
                ..Self::failed(method, "no text extracted")
            };
        }
        Self {
            success: true,
            text: Some(text),
            confidence: confidence.clamp(0.0, 1.0),
            page_count,
            method,
            error: None,
            all_in_one: None,
        }
    }

    pub fn failed(method: ExtractionMethod, error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: None,
            confidence: 0.0,
            page_count: None,
            method,
            error: Some(error.into()),
            all_in_one: None,
        }
    }

    /// Terminal result for documents over the page limit.
    pub fn manual_review(estimated_pages: u32, limit: u32) -> Self {
        Self {
            page_count: Some(estimated_pages),
            ..Self::failed(
                ExtractionMethod::ManualReview,
                format!(
                    "estimated {} pages exceeds the limit of {}; manual review required",
                    estimated_pages, limit
                ),
            )
        }
    }

    pub fn with_all_in_one(mut self, outcome: AllInOneOutcome) -> Self {
        if self.success {
            self.all_in_one = Some(outcome);
        }
        self
    }

    /// Characters of real content, not counting page marker lines.
    pub fn content_len(&self) -> usize {
        self.text
            .as_deref()
            .map(|t| {
                t.lines()
                    .filter(|l| !is_page_marker(l))
                    .map(|l| l.trim().chars().count())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// The sufficiency predicate.
    pub fn is_sufficient(&self, min_text_length: usize) -> bool {
        self.success && self.content_len() >= min_text_length
    }

    /// Whether downstream pipeline stages can be skipped.
    pub fn completes_pipeline(&self) -> bool {
        self.success && self.all_in_one.is_some()
    }
}

/// One way of getting text out of a PDF.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    /// Lower runs first.
    fn priority(&self) -> u32;

    /// Expensive strategies are gated by the page-limit check.
    fn is_expensive(&self) -> bool {
        false
    }

    fn can_handle(&self, ctx: &ExtractionContext) -> bool;

    /// Must not panic or return errors; failures go in the result.
    async fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult;
}

/// Runs strategies in priority order until one is sufficient.
#[derive(Clone)]
pub struct ExtractionOrchestrator {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl ExtractionOrchestrator {
    pub fn new(mut strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    /// Strategy names in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let mut last: Option<ExtractionResult> = None;

        for strategy in &self.strategies {
            if strategy.is_expensive() {
                let estimated = ctx.estimated_pages();
                if estimated > ctx.max_pages {
                    warn!(
                        "{}: ~{} pages exceeds limit {}, skipping {}, manual review needed",
                        ctx.filename,
                        estimated,
                        ctx.max_pages,
                        strategy.name()
                    );
                    return ExtractionResult::manual_review(estimated, ctx.max_pages);
                }
            }

            if !strategy.can_handle(ctx) {
                debug!("{}: {} cannot handle input", ctx.filename, strategy.name());
                continue;
            }

            debug!("{}: trying {}", ctx.filename, strategy.name());
            let result = match AssertUnwindSafe(strategy.extract(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => ExtractionResult::failed(
                    strategy.method(),
                    format!("{} strategy panicked", strategy.name()),
                ),
            };

            if result.completes_pipeline() {
                info!(
                    "{}: {} completed the whole pipeline",
                    ctx.filename,
                    strategy.name()
                );
                return result;
            }

            if result.is_sufficient(ctx.min_text_length) {
                info!(
                    "{}: extracted {} chars via {}",
                    ctx.filename,
                    result.content_len(),
                    result.method
                );
                return result;
            }

            debug!(
                "{}: {} insufficient ({} chars{})",
                ctx.filename,
                strategy.name(),
                result.content_len(),
                result
                    .error
                    .as_deref()
                    .map(|e| format!(", {}", e))
                    .unwrap_or_default()
            );
            last = Some(result);
        }

        last.unwrap_or_else(|| {
            ExtractionResult::failed(
                ExtractionMethod::ManualReview,
                "no extraction strategy could handle this document",
            )
        })
    }
}
