//! Multi-document boundary detection.
//!
//! A single PDF often bundles several documents (an invoice followed by a
//! payslip, say). The detector extracts the text once through the
//! extraction orchestrator, asks the model where each document starts and
//! ends, and cuts the text into fragments.

mod markers;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classification::{canonical_type, UNKNOWN_TYPE};
use crate::extraction::{
    join_pages, ExtractionConfig, ExtractionContext, ExtractionMethod, ExtractionOrchestrator,
    PAGE_MARKER_PREFIX,
};
use crate::llm::prompts::{render, BOUNDARY_PROMPT};
use crate::llm::{extract_json_object, truncate_chars, LanguageModel, ModelConfig};
use crate::pdf::PAGE_BREAK;
use crate::registry::TypeRegistry;

pub use markers::{
    find_marker, line_range_fragment, resolve_fragment, FragmentResolution, LINE_TOLERANCE,
};

/// Confidence given to the whole-document segment when the model answer is unusable.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// One logical document found inside the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedDocumentSegment {
    /// Canonical type when supported, otherwise the model's own label.
    pub document_type: String,
    pub is_supported_by_pipeline: bool,
    pub start_line: usize,
    pub end_line: usize,
    pub confidence: f64,
    pub title: Option<String>,
    pub fragment: String,
    pub resolution: FragmentResolution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub has_multiple_documents: bool,
    pub segments: Vec<DetectedDocumentSegment>,
    pub page_count: Option<u32>,
    /// `None` when the text was supplied directly.
    pub extraction_method: Option<ExtractionMethod>,
    /// The text sent to the model was cut to fit its budget.
    pub truncated: bool,
    /// Set when extraction or the model call failed.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(rename = "type", default)]
    document_type: Option<String>,
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    end_line: Option<usize>,
    #[serde(default)]
    start_marker: Option<String>,
    #[serde(default)]
    end_marker: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoundaryResponse {
    documents: Vec<RawSegment>,
}

/// Make page breaks visible as `--- Page N ---` lines.
///
/// OCR output already carries markers; direct extraction separates pages with
/// form feeds.
pub fn with_page_markers(text: &str) -> String {
    if text.lines().any(|l| l.trim_start().starts_with(PAGE_MARKER_PREFIX)) {
        return text.to_string();
    }
    let pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    join_pages(1, &pages)
}

pub struct MultiDocumentBoundaryDetector {
    extractor: ExtractionOrchestrator,
    extraction: ExtractionConfig,
    model: Arc<dyn LanguageModel>,
    model_config: ModelConfig,
    types: Arc<TypeRegistry>,
}

impl MultiDocumentBoundaryDetector {
    pub fn new(
        extractor: ExtractionOrchestrator,
        extraction: ExtractionConfig,
        model: Arc<dyn LanguageModel>,
        model_config: ModelConfig,
        types: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            extractor,
            extraction,
            model,
            model_config,
            types,
        }
    }

    /// Extract `bytes` and split the text into documents. Never fails.
    pub async fn analyze(&self, bytes: impl Into<Arc<[u8]>>, filename: &str) -> AnalysisResult {
        let ctx = ExtractionContext::new(bytes, filename).with_config(&self.extraction);
        let extracted = self.extractor.extract(&ctx).await;

        let text = match extracted.text.as_deref() {
            Some(text) if extracted.success => text,
            _ => {
                let error = extracted
                    .error
                    .clone()
                    .unwrap_or_else(|| "no text extracted".to_string());
                warn!("{}: boundary analysis skipped: {}", filename, error);
                return AnalysisResult {
                    has_multiple_documents: false,
                    segments: Vec::new(),
                    page_count: extracted.page_count,
                    extraction_method: Some(extracted.method),
                    truncated: false,
                    error: Some(error),
                };
            }
        };

        let mut result = self.analyze_text(text, filename).await;
        result.page_count = extracted.page_count;
        result.extraction_method = Some(extracted.method);
        result
    }

    /// Split already-extracted text. Never fails.
    pub async fn analyze_text(&self, text: &str, filename: &str) -> AnalysisResult {
        let marked = with_page_markers(text);
        let budget = self.model.char_budget();
        let (analyzed, truncated) = truncate_chars(&marked, budget);
        if truncated {
            warn!(
                "{}: text truncated to {} chars for boundary analysis",
                filename, budget
            );
        }

        let prompt = render(
            BOUNDARY_PROMPT,
            &[
                ("filename", filename),
                ("types", &self.types.supported_types().join(", ")),
                ("content", analyzed),
            ],
        );

        // Fragments are always cut from the full text, even when the model saw a prefix.
        let reply = self.model.generate(&prompt, &self.model_config).await;
        let (segments, error): (Vec<DetectedDocumentSegment>, Option<String>) = match reply {
            Ok(reply) => match parse_response(&reply) {
                Some(raw) if !raw.is_empty() => (
                    raw.iter().map(|s| self.build_segment(&marked, s)).collect(),
                    None,
                ),
                _ => {
                    warn!(
                        "{}: boundary response unusable, treating as one document",
                        filename
                    );
                    (
                        vec![whole_document(&marked, "unparseable model response")],
                        None,
                    )
                }
            },
            Err(e) => {
                warn!("{}: boundary detection call failed: {}", filename, e);
                (
                    vec![whole_document(&marked, "model call failed")],
                    Some(e.to_string()),
                )
            }
        };

        let precise = segments.iter().filter(|s| s.resolution.is_precise()).count();
        info!(
            "{}: {} segment(s), {} cut by markers",
            filename,
            segments.len(),
            precise
        );

        AnalysisResult {
            has_multiple_documents: segments.len() > 1,
            segments,
            page_count: None,
            extraction_method: None,
            truncated,
            error,
        }
    }

    fn build_segment(&self, text: &str, raw: &RawSegment) -> DetectedDocumentSegment {
        let total_lines = text.lines().count().max(1);
        let mut start_line = raw.start_line.unwrap_or(1).clamp(1, total_lines);
        let mut end_line = raw.end_line.unwrap_or(total_lines).clamp(1, total_lines);
        if end_line < start_line {
            std::mem::swap(&mut start_line, &mut end_line);
        }

        let (fragment, resolution) = resolve_fragment(
            text,
            start_line,
            end_line,
            raw.start_marker.as_deref(),
            raw.end_marker.as_deref(),
        );
        if let FragmentResolution::LineRange { reason } = &resolution {
            debug!("segment {}-{} cut by lines: {}", start_line, end_line, reason);
        }

        let label = raw
            .document_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_TYPE);
        let canonical = canonical_type(label);
        let is_supported_by_pipeline = self.types.is_supported(&canonical);

        DetectedDocumentSegment {
            document_type: if is_supported_by_pipeline {
                canonical
            } else {
                label.to_string()
            },
            is_supported_by_pipeline,
            start_line,
            end_line,
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            title: raw.title.clone().filter(|t| !t.trim().is_empty()),
            fragment,
            resolution,
        }
    }
}

fn parse_response(reply: &str) -> Option<Vec<RawSegment>> {
    let value = extract_json_object(reply)?;
    serde_json::from_value::<BoundaryResponse>(value)
        .ok()
        .map(|r| r.documents)
}

fn whole_document(text: &str, reason: &str) -> DetectedDocumentSegment {
    DetectedDocumentSegment {
        document_type: UNKNOWN_TYPE.to_string(),
        is_supported_by_pipeline: false,
        start_line: 1,
        end_line: text.lines().count().max(1),
        confidence: FALLBACK_CONFIDENCE,
        title: None,
        fragment: text.to_string(),
        resolution: FragmentResolution::LineRange {
            reason: reason.to_string(),
        },
    }
}
