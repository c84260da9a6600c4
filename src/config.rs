//! Configuration management for docpipe using the prefer crate.
//!
//! A config file is discovered with `prefer` (or given explicitly) and parsed
//! with serde according to its extension. Every section has defaults, so a
//! missing or broken file still yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classification::ClassifierConfig;
use crate::extraction::ExtractionConfig;
use crate::llm::LlmConfig;
use crate::ocr::OcrConfig;
use crate::pipeline::ChunkingConfig;
use crate::retry::RetryPolicy;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "docpipe.db";

/// Default type schema location, relative to the config file.
pub const DEFAULT_SCHEMA_PATH: &str = "schema/document_types.yaml";

/// Default documents subdirectory name.
const DOCUMENTS_SUBDIR: &str = "documents";

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Explicit database URL (overrides `data_dir`/`database_filename`).
    pub database_url: Option<String>,
    /// Where registered document bytes are stored.
    pub documents_dir: PathBuf,
    /// Type schema file.
    pub schema_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/docpipe, falling back to the home dir, then the CWD.
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docpipe");

        Self {
            documents_dir: data_dir.join(DOCUMENTS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
        }
    }
}

impl Settings {
    /// Settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            documents_dir: data_dir.join(DOCUMENTS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Database URL, constructed from the data dir unless set explicitly.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.documents_dir)?;
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Type schema file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retries for storage reads and writes.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load `docpipe` configuration in standard locations.
    pub async fn load() -> Self {
        match prefer::load("docpipe").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Expand `~` and resolve relative paths against `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.documents_dir = settings.data_dir.join(DOCUMENTS_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        settings.schema_path = self.resolve_path(
            self.schema_path.as_deref().unwrap_or(DEFAULT_SCHEMA_PATH),
            base_dir,
        );
    }
}

/// Load config (explicit path or discovery) and resolve settings from it.
pub async fn load_settings(config_path: Option<&Path>) -> (Settings, Config) {
    let config = match config_path {
        Some(path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);

    // DATABASE_URL takes precedence over the config file.
    if let Some(url) = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        debug!("Using DATABASE_URL from environment: {}", url);
        settings.database_url = Some(url);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_toml_with_partial_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docpipe.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"
schema_path = "types.yaml"

[extraction]
min_text_length = 80

[classifier]
text_threshold = 0.75
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.extraction.min_text_length, 80);
        assert_eq!(config.extraction.max_pages_for_expensive, 5);
        assert_eq!(config.classifier.text_threshold, 0.75);
        assert_eq!(config.classifier.filename_threshold, 0.9);

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());
        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.documents_dir, dir.path().join("data").join("documents"));
        assert_eq!(settings.schema_path, dir.path().join("types.yaml"));
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docpipe.yaml");
        std::fs::write(&path, "database: other.db\nchunking:\n  max_chunk_chars: 500\n").unwrap();
        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("other.db"));
        assert_eq!(config.chunking.max_chunk_chars, 500);
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docpipe.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from_path(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_explicit_broken_path_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let (settings, config) = load_settings(Some(&dir.path().join("missing.toml"))).await;
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
    }

    #[test]
    fn test_resolve_path_expands_tilde() {
        let config = Config::default();
        let resolved = config.resolve_path("~/docs", Path::new("/base"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert_eq!(config.resolve_path("/abs", Path::new("/base")), PathBuf::from("/abs"));
        assert_eq!(config.resolve_path("rel", Path::new("/base")), PathBuf::from("/base/rel"));
    }

    #[test]
    fn test_database_url_from_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/dp"));
        assert_eq!(settings.database_url(), "sqlite:/tmp/dp/docpipe.db");
    }
}
