//! Embedded text layer extraction.
//!
//! Tries lopdf in-process first. When that fails or finds too little text,
//! falls back to `pdftotext` in a child process with a hard timeout, and
//! keeps whichever output is longer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ExtractionContext, ExtractionMethod, ExtractionResult, ExtractionStrategy};
use crate::pdf::{self, PdfText};

const DIRECT_TEXT_CONFIDENCE: f64 = 0.95;

pub struct DirectTextExtractor {
    subprocess_timeout: Duration,
    subprocess_fallback: bool,
}

impl DirectTextExtractor {
    pub fn new(subprocess_timeout: Duration) -> Self {
        Self {
            subprocess_timeout,
            subprocess_fallback: true,
        }
    }

    /// Disable the out-of-process fallback (in-process parsing only).
    pub fn in_process_only(mut self) -> Self {
        self.subprocess_fallback = false;
        self
    }
}

fn text_len(text: &PdfText) -> usize {
    text.text.trim().chars().count()
}

#[async_trait]
impl ExtractionStrategy for DirectTextExtractor {
    fn name(&self) -> &'static str {
        "direct-text"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::DirectText
    }

    fn priority(&self) -> u32 {
        10
    }

    fn can_handle(&self, ctx: &ExtractionContext) -> bool {
        !ctx.bytes.is_empty()
    }

    async fn extract(&self, ctx: &ExtractionContext) -> ExtractionResult {
        let in_process = pdf::extract_text_in_process(ctx.bytes.clone()).await;

        let needs_fallback = match &in_process {
            Ok(text) => text_len(text) < ctx.min_text_length,
            Err(e) => {
                debug!("{}: in-process parse failed: {}", ctx.filename, e);
                true
            }
        };

        let best = if needs_fallback && self.subprocess_fallback {
            let subprocess =
                pdf::extract_text_subprocess(&ctx.bytes, self.subprocess_timeout).await;
            match (in_process, subprocess) {
                (Ok(a), Ok(b)) => Ok(if text_len(&b) > text_len(&a) { b } else { a }),
                (Ok(a), Err(e)) => {
                    debug!("{}: pdftotext fallback failed: {}", ctx.filename, e);
                    Ok(a)
                }
                (Err(_), Ok(b)) => Ok(b),
                (Err(a), Err(b)) => Err(format!("{}; fallback: {}", a, b)),
            }
        } else {
            in_process.map_err(|e| e.to_string())
        };

        match best {
            Ok(text) => ExtractionResult::succeeded(
                ExtractionMethod::DirectText,
                text.text,
                DIRECT_TEXT_CONFIDENCE,
                Some(text.page_count),
            ),
            Err(e) => ExtractionResult::failed(ExtractionMethod::DirectText, e),
        }
    }
}
