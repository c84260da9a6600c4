//! Tesseract OCR backend implementation.
//!
//! Renders the requested pages with pdftoppm and runs tesseract in TSV mode
//! so every word carries a confidence.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{OcrConfig, OcrError, OcrPageBatch, OcrProvider, PageRange};
use crate::pdf::{self, PdfError};

/// Tesseract OCR backend.
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Run Tesseract on an image file, returning page text and mean word confidence.
    async fn run_tesseract(&self, image_path: &Path) -> Result<(String, f64), OcrError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language])
            .arg("tsv")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let hint = "tesseract (install tesseract-ocr)";
        let tsv = pdf::run_tool(cmd, "tesseract", hint, self.timeout())
            .await
            .map_err(map_pdf_error)?;
        Ok(parse_tsv(&tsv))
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

fn map_pdf_error(e: PdfError) -> OcrError {
    match e {
        PdfError::ToolNotFound(hint) => OcrError::NotConfigured(hint),
        PdfError::Io(e) => OcrError::Io(e),
        other => OcrError::Provider(other.to_string()),
    }
}

#[async_trait]
impl OcrProvider for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_configured(&self) -> bool {
        which::which("tesseract").is_ok() && which::which("pdftoppm").is_ok()
    }

    fn max_pages_per_request(&self) -> u32 {
        self.config.pages_per_batch.max(1)
    }

    async fn detect_document_text(
        &self,
        pdf_bytes: &[u8],
        pages: PageRange,
    ) -> Result<OcrPageBatch, OcrError> {
        let temp_dir = TempDir::new()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes).await?;

        let images = pdf::render_pages(
            &pdf_path,
            pages.first,
            pages.last,
            self.config.dpi,
            temp_dir.path(),
            self.timeout(),
        )
        .await
        .map_err(map_pdf_error)?;

        let mut batch = OcrPageBatch::default();
        for page in pages.first..=pages.last {
            // A page pdftoppm did not render is reported empty, keeping page order intact.
            let (text, confidence) = match images.iter().find(|(p, _)| *p == page) {
                Some((_, image)) => self.run_tesseract(image).await?,
                None => (String::new(), 0.0),
            };
            batch.page_texts.push(text);
            batch.confidences.push(confidence);
        }
        Ok(batch)
    }
}

/// Rebuild text from tesseract TSV and compute the mean word confidence (0-1).
///
/// Words on the same line are joined with spaces; paragraphs are separated
/// by a blank line.
pub(crate) fn parse_tsv(tsv: &str) -> (String, f64) {
    let mut out = String::new();
    let mut last_line: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0;
    let mut conf_count = 0u32;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        match last_line {
            Some(prev) if prev == key => out.push(' '),
            Some(prev) if (prev.0, prev.1) != (key.0, key.1) => out.push_str("\n\n"),
            Some(_) => out.push('\n'),
            None => {}
        }
        out.push_str(word);
        last_line = Some(key);

        if let Ok(conf) = cols[10].parse::<f64>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
    }

    let confidence = if conf_count == 0 {
        0.0
    } else {
        (conf_sum / conf_count as f64 / 100.0).clamp(0.0, 1.0)
    };
    (out, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t
5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tFACTURA
5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\tN\u{ba}
5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t70\tTotal
5\t1\t2\t1\t1\t1\t0\t0\t10\t10\t60\tGracias
";

    #[test]
    fn test_parse_tsv_rebuilds_lines_and_paragraphs() {
        let (text, confidence) = parse_tsv(TSV);
        assert_eq!(text, "FACTURA N\u{ba}\nTotal\n\nGracias");
        assert!((confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_empty() {
        assert_eq!(parse_tsv(""), (String::new(), 0.0));
    }

    #[test]
    fn test_batch_size_never_zero() {
        let ocr = TesseractOcr::new(OcrConfig {
            pages_per_batch: 0,
            ..OcrConfig::default()
        });
        assert_eq!(ocr.max_pages_per_request(), 1);
    }
}
