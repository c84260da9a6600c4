//! Prompt templates. Placeholders are `{name}` and are filled with `str::replace`.

/// Tier-3 classification prompt.
pub const CLASSIFY_PROMPT: &str = r#"You are classifying a business document.

Known document types: {types}

Filename: {filename}

Document preview:
{content}

Respond with ONLY a JSON object of the form:
{"type": "<one of the known types, or a short lowercase label if none fit>", "confidence": <0.0-1.0>, "reasoning": "<one sentence>"}"#;

/// Multi-document boundary detection prompt.
pub const BOUNDARY_PROMPT: &str = r#"The text below was extracted from a single PDF file named "{filename}" that may contain several independent documents (for example an invoice followed by a payslip).

Known document types: {types}

Rules:
- Lines of the form "--- Page N ---" are page breaks. Prefer page breaks as boundaries over content-based cues.
- Line numbers are 1-based and refer to the text exactly as given.
- start_marker and end_marker must be copied VERBATIM from the text, at least 15 characters each. start_marker is the text immediately before the document's content begins (for example its page break line); end_marker is the text immediately after it ends (for example the next page break line).
- If the file holds a single document, return exactly one entry.

Respond with ONLY a JSON object:
{"documents": [{"type": "...", "start_line": 1, "end_line": 40, "start_marker": "...", "end_marker": "...", "confidence": 0.0, "title": "..."}]}

Text:
{content}"#;

/// Structured field extraction for a known document type.
pub const FIELD_EXTRACTION_PROMPT: &str = r#"Extract structured data from this {type_name} document.

Return ONLY a JSON object with these keys (use null when a value is not present):
{fields}

Dates as YYYY-MM-DD, amounts as plain numbers without currency symbols.

Document:
{content}"#;

/// Best-effort metadata for document types without a dedicated agent.
pub const GENERIC_METADATA_PROMPT: &str = r#"Summarize the key metadata of this document.

Return ONLY a JSON object:
{"title": "...", "date": "YYYY-MM-DD or null", "issuer": "... or null", "total_amount": <number or null>, "summary": "one sentence"}

Document:
{content}"#;

/// Single-call OCR + classification + extraction for small PDFs.
pub const ALL_IN_ONE_PROMPT: &str = r#"Read the attached PDF. In one answer:
1. Transcribe its full text.
2. Classify it as one of: {types}
3. Extract the fields listed for that type.

Fields per type:
{fields}

Respond with ONLY a JSON object:
{"text": "<full transcription>", "page_count": <n>, "type": "...", "confidence": 0.0, "fields": {...}}"#;

/// Page-by-page transcription used by the Gemini OCR provider.
pub const OCR_DOCUMENT_PROMPT: &str = r#"Transcribe the text of pages {first} to {last} of the attached PDF exactly as printed, preserving line breaks. Separate pages with a single form feed character (\f). Output only the transcription."#;

/// Fill `{key}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let prompt = render(CLASSIFY_PROMPT, &[("types", "factura, nomina"), ("filename", "a.pdf"), ("content", "hola")]);
        assert!(prompt.contains("Known document types: factura, nomina"));
        assert!(prompt.contains("Filename: a.pdf"));
        assert!(!prompt.contains("{content}"));
        // JSON braces in the template survive.
        assert!(prompt.contains("{\"type\""));
    }
}
