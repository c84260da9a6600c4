//! LLM client configuration.

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
    /// Google Gemini `generateContent` API (accepts inline PDF documents)
    Gemini,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Characters of document text a single prompt may carry for this provider.
    pub fn default_char_budget(&self) -> usize {
        match self {
            Self::Ollama => 24_000,
            Self::OpenAI => 120_000,
            Self::Gemini => 400_000,
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAI => "https://api.openai.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard wall-clock limit for one provider call.
    pub timeout_ms: u64,
}

impl ModelConfig {
    pub fn new(temperature: f32, max_tokens: u32, timeout_ms: u64) -> Self {
        Self {
            temperature,
            max_tokens,
            timeout_ms,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Configuration for LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether LLM-backed tiers and agents are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// LLM provider (ollama, openai or gemini)
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (provider-specific defaults apply)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for hosted providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum characters of document content per prompt (provider default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_chars: Option<usize>,
    /// Retries for transient failures (timeouts, 429/5xx, empty responses)
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    LlmProvider::Ollama.default_endpoint().to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub fn base_default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
            max_content_chars: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true" or "false"
    /// - `LLM_PROVIDER`: "ollama" (default), "openai", "groq", "together" or "gemini"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for hosted providers
    /// - `LLM_MODEL`: Model name
    /// - `LLM_MAX_TOKENS`: Maximum tokens in response
    /// - `LLM_TEMPERATURE`: Generation temperature (0.0-1.0)
    /// - `LLM_TIMEOUT_MS`: Per-call timeout
    /// - `LLM_MAX_CONTENT_CHARS`: Max document chars to send
    ///
    /// LLM_PROVIDER wins over auto-detection from `GEMINI_API_KEY`,
    /// `GROQ_API_KEY` or `OPENAI_API_KEY`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_provider = std::env::var("LLM_PROVIDER").ok();
        if let Some(provider) = explicit_provider.as_deref().and_then(LlmProvider::from_str) {
            self.provider = provider;
        }

        let explicit_endpoint = std::env::var("LLM_ENDPOINT").ok();
        if let Some(ref endpoint) = explicit_endpoint {
            self.endpoint = endpoint.clone();
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.api_key = Some(val);
        }

        if let Some(ref provider_str) = explicit_provider {
            let provider_lower = provider_str.to_lowercase();
            if explicit_endpoint.is_none() {
                self.endpoint = match provider_lower.as_str() {
                    "groq" => "https://api.groq.com/openai".to_string(),
                    "together" => "https://api.together.xyz".to_string(),
                    _ => self.provider.default_endpoint().to_string(),
                };
            }
            if self.api_key.is_none() {
                self.api_key = match provider_lower.as_str() {
                    "groq" => std::env::var("GROQ_API_KEY").ok(),
                    "openai" => std::env::var("OPENAI_API_KEY").ok(),
                    "gemini" | "google" => std::env::var("GEMINI_API_KEY").ok(),
                    _ => None,
                };
            }
        } else if self.api_key.is_none() {
            let detected = [
                ("GEMINI_API_KEY", LlmProvider::Gemini, None),
                (
                    "GROQ_API_KEY",
                    LlmProvider::OpenAI,
                    Some("https://api.groq.com/openai"),
                ),
                ("OPENAI_API_KEY", LlmProvider::OpenAI, None),
            ]
            .into_iter()
            .find_map(|(var, provider, endpoint)| {
                std::env::var(var).ok().map(|key| (key, provider, endpoint))
            });

            if let Some((key, provider, endpoint)) = detected {
                self.api_key = Some(key);
                self.provider = provider;
                if explicit_endpoint.is_none() {
                    self.endpoint = endpoint
                        .unwrap_or(provider.default_endpoint())
                        .to_string();
                }
            }
        }

        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.model = val;
        } else if self.provider == LlmProvider::Gemini && self.model == default_model() {
            self.model = "gemini-1.5-flash".to_string();
        }
        if let Some(n) = env_parse("LLM_MAX_TOKENS") {
            self.max_tokens = n;
        }
        if let Some(t) = env_parse("LLM_TEMPERATURE") {
            self.temperature = t;
        }
        if let Some(ms) = env_parse("LLM_TIMEOUT_MS") {
            self.timeout_ms = ms;
        }
        if let Some(n) = env_parse("LLM_MAX_CONTENT_CHARS") {
            self.max_content_chars = Some(n);
        }
        self
    }

    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.provider = provider;
        self.endpoint = provider.default_endpoint().to_string();
        self
    }

    /// Generation parameters derived from this config.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.temperature, self.max_tokens, self.timeout_ms)
    }

    /// Effective character budget per prompt.
    pub fn char_budget(&self) -> usize {
        self.max_content_chars
            .unwrap_or_else(|| self.provider.default_char_budget())
    }

    /// Whether the configured provider has the credentials it needs.
    pub fn has_credentials(&self) -> bool {
        match self.provider {
            LlmProvider::Ollama => true,
            LlmProvider::OpenAI | LlmProvider::Gemini => self.api_key.is_some(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!(LlmProvider::from_str("Groq"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::from_str("gemini"), Some(LlmProvider::Gemini));
        assert_eq!(LlmProvider::from_str("bard"), None);
    }

    #[test]
    fn test_char_budget_prefers_explicit_value() {
        let mut config = LlmConfig::base_default().with_provider(LlmProvider::Gemini);
        assert_eq!(config.char_budget(), 400_000);
        config.max_content_chars = Some(1000);
        assert_eq!(config.char_budget(), 1000);
    }

    #[test]
    fn test_hosted_providers_need_keys() {
        let config = LlmConfig::base_default().with_provider(LlmProvider::OpenAI);
        assert!(!config.has_credentials());
        assert!(LlmConfig::base_default().has_credentials());
    }
}
