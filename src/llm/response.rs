//! Helpers for turning free-form model output into structured data.

use serde_json::Value;

/// Pull the first JSON object out of a model response.
///
/// Handles markdown code fences and prose before or after the object.
pub fn extract_json_object(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str(unfenced.trim()) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&unfenced[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Truncate to at most `max_chars` characters (UTF-8 safe).
///
/// Returns the slice and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}
