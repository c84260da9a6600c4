//! Paragraph-based chunking of extracted text.

use serde::{Deserialize, Serialize};

use crate::extraction::is_page_marker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upper bound on characters per chunk.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

fn default_max_chunk_chars() -> usize {
    2000
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

/// Split text into paragraphs on blank lines, page markers and form feeds.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for page in text.split('\x0c') {
        let mut current: Vec<&str> = Vec::new();
        for line in page.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() || is_page_marker(line) {
                if !current.is_empty() {
                    out.push(current.join("\n"));
                    current.clear();
                }
                continue;
            }
            current.push(line);
        }
        if !current.is_empty() {
            out.push(current.join("\n"));
        }
    }
    out
}

/// Split `text` into pieces of at most `max` characters, on char boundaries.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Coarse chunks: paragraphs merged greedily up to `max_chars`; a paragraph
/// longer than that is cut into `max_chars` pieces.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in paragraphs(text) {
        let len = paragraph.chars().count();
        if len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(hard_split(&paragraph, max_chars));
            continue;
        }

        // +2 for the blank line joining paragraphs.
        let joined_len = if current.is_empty() { len } else { current_len + 2 + len };
        if joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(&paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
