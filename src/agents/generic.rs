//! Best-effort metadata for documents with no dedicated agent.
//!
//! Asks the model for a title/date/issuer/amount summary. When the model is
//! unavailable or answers with garbage, falls back to simple text heuristics
//! and reports the result as degraded.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use super::MetadataOutcome;
use crate::llm::prompts::{render, GENERIC_METADATA_PROMPT};
use crate::llm::{extract_json_object, truncate_chars, LanguageModel, ModelConfig};

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b|\b(\d{4})-(\d{2})-(\d{2})\b").unwrap()
});

static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d{3})*(?:,\d{2})|\d+(?:[.,]\d{2})?)\s*(?:€|EUR)").unwrap()
});

const TITLE_MAX_CHARS: usize = 120;

pub struct GenericMetadataAgent {
    model: Option<Arc<dyn LanguageModel>>,
    model_config: ModelConfig,
}

impl GenericMetadataAgent {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, model_config: ModelConfig) -> Self {
        Self {
            model,
            model_config,
        }
    }

    pub async fn extract(&self, text: &str) -> MetadataOutcome {
        let model = match &self.model {
            Some(model) if model.is_configured() => model,
            _ => {
                return MetadataOutcome::Degraded {
                    data: heuristic_metadata(text),
                    reason: "language model not configured".to_string(),
                }
            }
        };

        let (content, _) = truncate_chars(text, model.char_budget());
        let prompt = render(GENERIC_METADATA_PROMPT, &[("content", content)]);
        let reason = match model.generate(&prompt, &self.model_config).await {
            Ok(response) => match extract_json_object(&response) {
                Some(data) => return MetadataOutcome::Extracted(data),
                None => "model returned no JSON object".to_string(),
            },
            Err(e) => e.to_string(),
        };

        warn!("Generic metadata falling back to heuristics: {}", reason);
        MetadataOutcome::Degraded {
            data: heuristic_metadata(text),
            reason,
        }
    }
}

/// First non-empty line as title, first date, largest euro amount.
pub(crate) fn heuristic_metadata(text: &str) -> Value {
    let title = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !crate::extraction::is_page_marker(line))
        .map(|line| line.chars().take(TITLE_MAX_CHARS).collect::<String>());

    json!({
        "title": title,
        "date": find_date(text),
        "issuer": Value::Null,
        "total_amount": largest_amount(text),
        "summary": Value::Null,
    })
}

fn find_date(text: &str) -> Option<String> {
    let caps = DATE_PATTERN.captures(text)?;
    if let (Some(d), Some(m), Some(y)) = (caps.get(1), caps.get(2), caps.get(3)) {
        let day: u32 = d.as_str().parse().ok()?;
        let month: u32 = m.as_str().parse().ok()?;
        let date = chrono::NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day)?;
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let (y, m, d) = (caps.get(4)?, caps.get(5)?, caps.get(6)?);
    let date = chrono::NaiveDate::from_ymd_opt(
        y.as_str().parse().ok()?,
        m.as_str().parse().ok()?,
        d.as_str().parse().ok()?,
    )?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Parse a Spanish-formatted amount: `1.234,56` or `12,50` or `12.50`.
fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.to_string()
    };
    normalized.parse().ok()
}

fn largest_amount(text: &str) -> Option<f64> {
    AMOUNT_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| parse_amount(m.as_str())))
        .fold(None, |best: Option<f64>, amount| {
            Some(best.map_or(amount, |b| b.max(amount)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::LlmError;

    const SAMPLE: &str = "--- Page 1 ---\nRecibo de alquiler\nFecha: 05/03/2024\n\
        Importe: 650,00 €\nFianza 1.300,00 EUR\n";

    #[test]
    fn test_heuristics() {
        let data = heuristic_metadata(SAMPLE);
        assert_eq!(data["title"], "Recibo de alquiler");
        assert_eq!(data["date"], "2024-03-05");
        assert_eq!(data["total_amount"], 1300.0);
    }

    #[test]
    fn test_iso_dates_and_missing_values() {
        let data = heuristic_metadata("Nota 2023-12-31 sin importes");
        assert_eq!(data["date"], "2023-12-31");
        assert!(data["total_amount"].is_null());
    }

    #[tokio::test]
    async fn test_model_result_is_used() {
        let model = Arc::new(ScriptedModel::replying(
            r#"{"title": "Alquiler marzo", "total_amount": 650}"#,
        ));
        let agent = GenericMetadataAgent::new(Some(model), ModelConfig::new(0.1, 256, 1_000));
        let outcome = agent.extract(SAMPLE).await;
        match outcome {
            MetadataOutcome::Extracted(data) => assert_eq!(data["title"], "Alquiler marzo"),
            other => panic!("expected extracted outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_degrades() {
        let model = Arc::new(ScriptedModel::new(vec![Err(LlmError::Timeout(
            std::time::Duration::from_secs(1),
        ))]));
        let agent = GenericMetadataAgent::new(Some(model), ModelConfig::new(0.1, 256, 1_000));
        match agent.extract(SAMPLE).await {
            MetadataOutcome::Degraded { data, reason } => {
                assert_eq!(data["title"], "Recibo de alquiler");
                assert!(reason.contains("timed out") || !reason.is_empty());
            }
            other => panic!("expected degraded outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_model_is_degraded() {
        let agent = GenericMetadataAgent::new(None, ModelConfig::new(0.1, 256, 1_000));
        assert!(agent.extract(SAMPLE).await.is_degraded());
    }
}
