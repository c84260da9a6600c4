//! Blob storage for raw document bytes.
//!
//! Documents are stored content-addressed below a root directory:
//! `{root}/{hash[0..2]}/{sanitized_basename}-{hash[0..8]}.{extension}`.
//! The path relative to the root is what a [`Document`](crate::models::Document)
//! keeps as its `source_path`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::retry::{with_timeout, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    /// Retryable I/O failure (including timeouts).
    #[error("transient I/O error reading {path}: {message}")]
    TransientIo { path: String, message: String },
}

impl BlobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }
}

/// Source of raw document bytes.
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError>;
}

/// Blob source backed by a local directory.
pub struct FsBlobSource {
    root: PathBuf,
    timeout: Duration,
    retry: RetryPolicy,
}

impl FsBlobSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a stored path, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Store content and return its path relative to the root.
    pub async fn store(
        &self,
        content: &[u8],
        content_hash: &str,
        filename: &str,
    ) -> std::io::Result<String> {
        let (basename, extension) = split_filename(filename);
        let relative =
            content_storage_path_with_name(Path::new(""), content_hash, &basename, &extension);
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(relative.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl BlobSource for FsBlobSource {
    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path)?;
        self.retry
            .run("blob download", BlobError::is_transient, || {
                let full = full.clone();
                async move {
                    let read = with_timeout(self.timeout, tokio::fs::read(&full))
                        .await
                        .map_err(|e| BlobError::TransientIo {
                            path: path.to_string(),
                            message: e.to_string(),
                        })?;
                    read.map_err(|e| match e.kind() {
                        ErrorKind::NotFound => BlobError::NotFound(path.to_string()),
                        _ => BlobError::TransientIo {
                            path: path.to_string(),
                            message: e.to_string(),
                        },
                    })
                }
            })
            .await
    }
}

/// Construct the storage path with a full filename (including basename).
pub fn content_storage_path_with_name(
    root: &Path,
    content_hash: &str,
    basename: &str,
    extension: &str,
) -> PathBuf {
    let prefix = content_hash.get(..2).unwrap_or(content_hash);
    let short = content_hash.get(..8).unwrap_or(content_hash);
    let filename = format!("{}-{}.{}", sanitize_filename(basename), short, extension);
    root.join(prefix).join(filename)
}

/// Replace anything but ASCII alphanumerics, `-` and `_` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn split_filename(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    let basename = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "pdf".to_string());
    (basename, extension)
}
