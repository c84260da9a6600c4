//! Required-field validation for structured records.

use serde_json::Value;
use thiserror::Error;

/// Structured data is missing required fields.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("missing required fields: {}", missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<String>,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

/// Check that every field in `required` is present and non-empty.
///
/// Null, blank strings and empty arrays count as missing. Nothing is coerced.
pub fn validate_required(data: &Value, required: &[String]) -> Result<(), ValidationError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|field| is_blank(data.get(field.as_str())))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { missing })
    }
}
