//! Three-tier document classification.
//!
//! 1. Filename patterns (returns at >= 0.9).
//! 2. Keyword scoring over the extracted text (returns at >= 0.8).
//! 3. LLM classification of a text preview (returns at >= 0.7).
//!
//! When no tier reaches its threshold the best candidate seen is returned
//! with `fallback_used`. Tier failures are logged and never propagate.

mod vocabulary;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::prompts::{render, CLASSIFY_PROMPT};
use crate::llm::{extract_json_object, truncate_chars, LanguageModel, ModelConfig};
use crate::registry::TypeRegistry;
use crate::text::fold;

pub use vocabulary::{canonical_type, KeywordTable, UNKNOWN_TYPE};

/// Confidence ceiling for the keyword and AI tiers.
const MAX_CONFIDENCE: f64 = 0.95;

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationMethod {
    Filename,
    TextAnalysis,
    AiAgent,
    /// No tier produced a candidate.
    None,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filename => "filename",
            Self::TextAnalysis => "text-analysis",
            Self::AiAgent => "ai-agent",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub document_type: String,
    pub confidence: f64,
    pub method: ClassificationMethod,
    pub reasoning: Option<String>,
    /// No tier reached its threshold; this is the best candidate seen.
    pub fallback_used: bool,
}

impl ClassificationResult {
    fn candidate(
        document_type: impl Into<String>,
        confidence: f64,
        method: ClassificationMethod,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            confidence,
            method,
            reasoning,
            fallback_used: false,
        }
    }

    fn unknown() -> Self {
        Self {
            fallback_used: true,
            ..Self::candidate(UNKNOWN_TYPE, 0.0, ClassificationMethod::None, None)
        }
    }
}

/// Classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_filename_threshold")]
    pub filename_threshold: f64,
    #[serde(default = "default_text_threshold")]
    pub text_threshold: f64,
    #[serde(default = "default_ai_threshold")]
    pub ai_threshold: f64,
    /// Text must be longer than this for keyword analysis.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    /// Characters of text sent to the model.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_filename_threshold() -> f64 {
    0.9
}

fn default_text_threshold() -> f64 {
    0.8
}

fn default_ai_threshold() -> f64 {
    0.7
}

fn default_min_text_chars() -> usize {
    100
}

fn default_preview_chars() -> usize {
    4000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            filename_threshold: default_filename_threshold(),
            text_threshold: default_text_threshold(),
            ai_threshold: default_ai_threshold(),
            min_text_chars: default_min_text_chars(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Count whole-word occurrences of `needle` in `haystack` (both folded).
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .count()
}

/// Weighted keyword score: strong hits count three times.
pub fn keyword_score(folded_text: &str, table: &KeywordTable) -> usize {
    let strong: usize = table.strong.iter().map(|k| count_occurrences(folded_text, k)).sum();
    let medium: usize = table.medium.iter().map(|k| count_occurrences(folded_text, k)).sum();
    3 * strong + medium
}

/// Bounded, monotonic map from score to confidence.
pub fn score_confidence(score: usize) -> f64 {
    MAX_CONFIDENCE * (1.0 - (-(score as f64) / 10.0).exp())
}

#[derive(Debug, Deserialize)]
struct AiVerdict {
    #[serde(rename = "type")]
    document_type: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct DocumentClassifier {
    types: Arc<TypeRegistry>,
    keywords: std::collections::BTreeMap<String, KeywordTable>,
    model: Option<Arc<dyn LanguageModel>>,
    model_config: ModelConfig,
    config: ClassifierConfig,
}

impl DocumentClassifier {
    pub fn new(types: Arc<TypeRegistry>, config: ClassifierConfig) -> Self {
        let keywords = vocabulary::keyword_tables(&types);
        Self {
            types,
            keywords,
            model: None,
            model_config: ModelConfig::new(0.1, 256, 30_000),
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>, model_config: ModelConfig) -> Self {
        self.model = Some(model);
        self.model_config = model_config;
        self
    }

    pub async fn classify(
        &self,
        filename: &str,
        text: Option<&str>,
        use_ai: bool,
    ) -> ClassificationResult {
        let mut best: Option<ClassificationResult> = None;

        if let Some(result) = self.classify_filename(filename) {
            if result.confidence >= self.config.filename_threshold {
                debug!("{}: classified by filename as {}", filename, result.document_type);
                return result;
            }
            keep_best(&mut best, result);
        }

        let text = text.filter(|t| t.trim().chars().count() > self.config.min_text_chars);

        if let Some(text) = text {
            if let Some(result) = self.classify_text(text) {
                if result.confidence >= self.config.text_threshold {
                    debug!("{}: classified by keywords as {}", filename, result.document_type);
                    return result;
                }
                keep_best(&mut best, result);
            }

            if use_ai {
                if let Some(result) = self.classify_ai(filename, text).await {
                    if result.confidence >= self.config.ai_threshold {
                        debug!("{}: classified by model as {}", filename, result.document_type);
                        return result;
                    }
                    keep_best(&mut best, result);
                }
            }
        }

        match best {
            Some(mut result) => {
                result.fallback_used = true;
                debug!(
                    "{}: no tier confident, falling back to {} ({:.2}, {})",
                    filename, result.document_type, result.confidence, result.method
                );
                result
            }
            None => ClassificationResult::unknown(),
        }
    }

    fn classify_filename(&self, filename: &str) -> Option<ClassificationResult> {
        vocabulary::filename_matches(filename)
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(type_name, confidence)| {
                ClassificationResult::candidate(
                    type_name,
                    confidence,
                    ClassificationMethod::Filename,
                    None,
                )
            })
    }

    fn classify_text(&self, text: &str) -> Option<ClassificationResult> {
        let folded = fold(text);
        let (type_name, score) = self
            .keywords
            .iter()
            .map(|(type_name, table)| (type_name, keyword_score(&folded, table)))
            .filter(|(_, score)| *score > 0)
            // Highest score; ties go to the alphabetically first type.
            .fold(None, |best: Option<(&String, usize)>, (t, s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((t, s)),
            })?;

        Some(ClassificationResult::candidate(
            type_name.clone(),
            score_confidence(score),
            ClassificationMethod::TextAnalysis,
            Some(format!("keyword score {}", score)),
        ))
    }

    async fn classify_ai(&self, filename: &str, text: &str) -> Option<ClassificationResult> {
        let model = self.model.as_ref().filter(|m| m.is_configured())?;
        let (preview, _) = truncate_chars(text, self.config.preview_chars.min(model.char_budget()));
        let prompt = render(
            CLASSIFY_PROMPT,
            &[
                ("types", &self.types.supported_types().join(", ")),
                ("filename", filename),
                ("content", preview),
            ],
        );

        let reply = match model.generate(&prompt, &self.model_config).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{}: AI classification failed: {}", filename, e);
                return None;
            }
        };

        let verdict: AiVerdict = match extract_json_object(&reply).map(serde_json::from_value) {
            Some(Ok(verdict)) => verdict,
            _ => {
                warn!("{}: AI classification returned an unparseable answer", filename);
                return None;
            }
        };

        let document_type = canonical_type(&verdict.document_type);
        if document_type.is_empty() {
            return None;
        }
        Some(ClassificationResult::candidate(
            document_type,
            verdict.confidence.unwrap_or(0.0).clamp(0.0, MAX_CONFIDENCE),
            ClassificationMethod::AiAgent,
            verdict.reasoning,
        ))
    }
}

fn keep_best(best: &mut Option<ClassificationResult>, candidate: ClassificationResult) {
    if best.as_ref().map_or(true, |b| candidate.confidence > b.confidence) {
        *best = Some(candidate);
    }
}
