//! PDF helpers: in-process parsing with lopdf and poppler-utils subprocesses.
//!
//! Pages in extracted text are separated by form feeds (`\x0c`), the same
//! convention `pdftotext` uses.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::retry::with_timeout;

/// Page separator in extracted text.
pub const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    ToolFailed(String),

    #[error("{tool} timed out after {limit:?}")]
    Timeout { tool: &'static str, limit: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text pulled out of a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfText {
    /// Page texts joined with [`PAGE_BREAK`].
    pub text: String,
    pub page_count: u32,
}

/// Number of pages according to the PDF page tree.
pub fn page_count(bytes: &[u8]) -> Option<u32> {
    let doc = lopdf::Document::load_mem(bytes).ok()?;
    Some(doc.get_pages().len() as u32)
}

/// [`page_count`] on the blocking pool.
pub async fn page_count_async(bytes: Arc<[u8]>) -> Option<u32> {
    tokio::task::spawn_blocking(move || page_count(&bytes))
        .await
        .ok()
        .flatten()
}

/// Parse embedded text in-process.
///
/// Runs on the blocking pool; a panic inside the parser is reported as
/// [`PdfError::Parse`] instead of unwinding into the caller.
pub async fn extract_text_in_process(bytes: Arc<[u8]>) -> Result<PdfText, PdfError> {
    tokio::task::spawn_blocking(move || extract_text_blocking(&bytes))
        .await
        .map_err(|e| PdfError::Parse(format!("in-process parser aborted: {}", e)))?
}

fn extract_text_blocking(bytes: &[u8]) -> Result<PdfText, PdfError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        let text = doc
            .extract_text(&[*page_num])
            .map_err(|e| PdfError::Parse(format!("page {}: {}", page_num, e)))?;
        texts.push(text);
    }
    Ok(PdfText {
        text: texts.join(&PAGE_BREAK.to_string()),
        page_count: pages.len() as u32,
    })
}

/// Run `pdftotext -layout` in a child process with a hard wall-clock limit.
pub async fn extract_text_subprocess(bytes: &[u8], limit: Duration) -> Result<PdfText, PdfError> {
    let dir = tempfile::TempDir::new()?;
    let input = dir.path().join("input.pdf");
    tokio::fs::write(&input, bytes).await?;

    let mut cmd = Command::new("pdftotext");
    cmd.args(["-layout", "-enc", "UTF-8"])
        .arg(&input)
        .arg("-")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let stdout = run_tool(cmd, "pdftotext", "pdftotext (install poppler-utils)", limit).await?;
    Ok(parse_pdftotext_output(&stdout))
}

/// Split pdftotext output into pages.
///
/// pdftotext terminates every page with a form feed, so a trailing empty
/// segment is not a page.
pub fn parse_pdftotext_output(stdout: &str) -> PdfText {
    let mut pages: Vec<&str> = stdout.split(PAGE_BREAK).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    PdfText {
        text: pages.join(&PAGE_BREAK.to_string()),
        page_count: pages.len() as u32,
    }
}

/// Render pages `first..=last` to PNG with `pdftoppm`.
pub async fn render_pages(
    pdf_path: &Path,
    first: u32,
    last: u32,
    dpi: u32,
    output_dir: &Path,
    limit: Duration,
) -> Result<Vec<(u32, PathBuf)>, PdfError> {
    let mut cmd = Command::new("pdftoppm");
    cmd.args(["-png", "-r", &dpi.to_string()])
        .args(["-f", &first.to_string(), "-l", &last.to_string()])
        .arg(pdf_path)
        .arg(output_dir.join("page"))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    run_tool(cmd, "pdftoppm", "pdftoppm (install poppler-utils)", limit).await?;

    Ok((first..=last)
        .filter_map(|page| find_page_image(output_dir, page).map(|p| (page, p)))
        .collect())
}

/// Find the image file for a specific page number.
///
/// pdftoppm names files like page-01.png, page-02.png, etc.
/// The padding width varies based on total page count.
pub fn find_page_image(dir: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let path = dir.join(format!("page-{:0width$}.png", page_num, width = digits));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Spawn a configured command, wait with a deadline, and return stdout.
pub(crate) async fn run_tool(
    mut cmd: Command,
    tool: &'static str,
    install_hint: &str,
    limit: Duration,
) -> Result<String, PdfError> {
    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PdfError::ToolNotFound(install_hint.to_string()))
        }
        Err(e) => return Err(PdfError::Io(e)),
    };

    let output = with_timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| PdfError::Timeout { tool, limit })??;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(PdfError::ToolFailed(format!(
            "{} failed: {}",
            tool,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
