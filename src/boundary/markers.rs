//! Locating segment fragments by verbatim start/end markers.

use serde::Serialize;

/// Lines of slack allowed between a marker and the segment's claimed range.
pub const LINE_TOLERANCE: usize = 3;

/// How a segment's fragment was cut out of the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentResolution {
    /// Exact substring between the two markers.
    Markers,
    /// Lines `start_line..=end_line`; `reason` says why markers were not used.
    LineRange { reason: String },
}

impl FragmentResolution {
    pub fn is_precise(&self) -> bool {
        matches!(self, Self::Markers)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find `marker` in `text` at or after byte offset `from`.
///
/// Tries an exact match first, then one where every whitespace run on either
/// side compares equal to a single space. Returns the byte span in `text`.
pub fn find_marker(text: &str, marker: &str, from: usize) -> Option<(usize, usize)> {
    let marker = marker.trim();
    if marker.is_empty() || from > text.len() {
        return None;
    }
    if let Some(pos) = text[from..].find(marker) {
        return Some((from + pos, from + pos + marker.len()));
    }
    find_loose(text, marker, from)
}

fn find_loose(text: &str, marker: &str, from: usize) -> Option<(usize, usize)> {
    let needle = collapse_whitespace(marker);
    if needle.is_empty() {
        return None;
    }

    // One entry per char of `normalized`: the byte span it covers in `text`.
    let mut normalized = String::with_capacity(text.len() - from);
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(text.len() - from);
    let mut in_whitespace = false;
    for (i, c) in text[from..].char_indices() {
        let start = from + i;
        let end = start + c.len_utf8();
        if c.is_whitespace() {
            if in_whitespace {
                if let Some(last) = spans.last_mut() {
                    last.1 = end;
                }
                continue;
            }
            in_whitespace = true;
            normalized.push(' ');
        } else {
            in_whitespace = false;
            normalized.push(c);
        }
        spans.push((start, end));
    }

    let byte_idx = normalized.find(&needle)?;
    let first = normalized[..byte_idx].chars().count();
    let last = first + needle.chars().count() - 1;
    Some((spans.get(first)?.0, spans.get(last)?.1))
}

/// 1-based line number of byte offset `pos`.
pub fn line_of(text: &str, pos: usize) -> usize {
    text[..pos].matches('\n').count() + 1
}

/// Byte offset where 1-based `line` starts (end of text if past the end).
fn line_start(text: &str, line: usize) -> usize {
    if line <= 1 {
        return 0;
    }
    text.match_indices('\n')
        .nth(line - 2)
        .map(|(i, _)| i + 1)
        .unwrap_or(text.len())
}

/// Join lines `start_line..=end_line` (1-based, clamped).
pub fn line_range_fragment(text: &str, start_line: usize, end_line: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = start_line.clamp(1, lines.len());
    let end = end_line.clamp(start, lines.len());
    lines[start - 1..end].join("\n")
}

/// Cut a segment's fragment, preferring markers.
///
/// The marker cut is used only when both markers resolve, the start comes
/// before the end, and the start marker sits within the claimed line range
/// give or take [`LINE_TOLERANCE`] lines. Otherwise the line range is used.
pub fn resolve_fragment(
    text: &str,
    start_line: usize,
    end_line: usize,
    start_marker: Option<&str>,
    end_marker: Option<&str>,
) -> (String, FragmentResolution) {
    match marker_span(text, start_line, end_line, start_marker, end_marker) {
        Ok((start, end)) => (text[start..end].to_string(), FragmentResolution::Markers),
        Err(reason) => (
            line_range_fragment(text, start_line, end_line),
            FragmentResolution::LineRange { reason },
        ),
    }
}

fn marker_span(
    text: &str,
    start_line: usize,
    end_line: usize,
    start_marker: Option<&str>,
    end_marker: Option<&str>,
) -> Result<(usize, usize), String> {
    let start_marker = start_marker
        .filter(|m| !m.trim().is_empty())
        .ok_or("no start marker")?;
    let end_marker = end_marker
        .filter(|m| !m.trim().is_empty())
        .ok_or("no end marker")?;

    let search_from = line_start(text, start_line.saturating_sub(LINE_TOLERANCE));
    let (marker_start, fragment_start) = find_marker(text, start_marker, search_from)
        .ok_or_else(|| "start marker not found".to_string())?;

    let marker_line = line_of(text, marker_start);
    let lowest = start_line.saturating_sub(LINE_TOLERANCE).max(1);
    let highest = end_line.max(start_line) + LINE_TOLERANCE;
    if marker_line < lowest || marker_line > highest {
        return Err(format!(
            "start marker on line {} is outside lines {}-{}",
            marker_line, start_line, end_line
        ));
    }

    let (fragment_end, _) = find_marker(text, end_marker, fragment_start)
        .ok_or_else(|| "end marker not found after start marker".to_string())?;
    if fragment_end <= fragment_start {
        return Err("markers enclose no text".to_string());
    }
    Ok((fragment_start, fragment_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str =
        "--- Page 1 ---\nFACTURA F-1\nTotal 10 EUR\n--- Page 2 ---\nNOMINA enero\nLiquido 900\n";

    #[test]
    fn test_exact_marker_cut() {
        let (fragment, resolution) =
            resolve_fragment(TEXT, 1, 3, Some("--- Page 1 ---"), Some("--- Page 2 ---"));
        assert_eq!(resolution, FragmentResolution::Markers);
        assert_eq!(fragment, "\nFACTURA F-1\nTotal 10 EUR\n");
    }

    #[test]
    fn test_whitespace_insensitive_marker() {
        let (fragment, resolution) =
            resolve_fragment(TEXT, 4, 6, Some("Page 2 ---\n  NOMINA"), Some("Liquido  900"));
        assert!(resolution.is_precise());
        assert_eq!(fragment, " enero\n");
    }

    #[test]
    fn test_missing_marker_falls_back_to_lines() {
        let (fragment, resolution) =
            resolve_fragment(TEXT, 2, 3, Some("FACTURA X-9 nowhere"), Some("--- Page 2 ---"));
        assert_eq!(fragment, "FACTURA F-1\nTotal 10 EUR");
        assert!(matches!(
            resolution,
            FragmentResolution::LineRange { reason } if reason.contains("start marker")
        ));
    }

    #[test]
    fn test_marker_far_from_claimed_lines_is_rejected() {
        let mut text = String::from("--- Page 1 ---\nintro line\n");
        for i in 0..20 {
            text.push_str(&format!("filler {}\n", i));
        }
        text.push_str("Recibo de pago numero 77\nfin del recibo aqui\n");
        // Claims lines 1-2 but the start marker lives on line 23.
        let (_, resolution) =
            resolve_fragment(&text, 1, 2, Some("Recibo de pago numero 77"), Some("fin del recibo"));
        assert!(matches!(
            resolution,
            FragmentResolution::LineRange { reason } if reason.contains("outside")
        ));
    }

    #[test]
    fn test_reversed_markers_fall_back() {
        let (_, resolution) =
            resolve_fragment(TEXT, 1, 6, Some("NOMINA enero"), Some("FACTURA F-1"));
        assert!(!resolution.is_precise());
    }

    #[test]
    fn test_line_range_clamps() {
        assert_eq!(line_range_fragment("a\nb\nc", 0, 99), "a\nb\nc");
        assert_eq!(line_range_fragment("a\nb\nc", 3, 1), "c");
        assert_eq!(line_range_fragment("", 1, 2), "");
    }
}
