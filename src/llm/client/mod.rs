//! LLM client used by the classifier, boundary detector and extraction agents.
//!
//! Supports Ollama, OpenAI-compatible APIs and Gemini. Every call is raced
//! against `ModelConfig::timeout_ms` and transient failures are retried with
//! exponential backoff.

mod config;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::retry::{parse_retry_after, with_timeout};

pub use config::{LlmConfig, LlmProvider, ModelConfig};

/// Errors that can occur during LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Provider disabled or missing credentials; never retried.
    #[error("LLM not configured: {0}")]
    NotConfigured(String),
    /// The call did not finish within its deadline.
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
    /// Transport failure, HTTP error status or malformed response body.
    #[error("LLM provider error: {message}")]
    Provider { status: Option<u16>, message: String },
    #[error("LLM returned an empty response")]
    EmptyResponse,
    /// The provider cannot take this kind of input (e.g. PDF documents).
    #[error("unsupported by provider: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::EmptyResponse => true,
            Self::Provider { status: None, .. } => true,
            Self::Provider {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            Self::NotConfigured(_) | Self::Unsupported(_) => false,
        }
    }

    fn transport(e: impl std::fmt::Display) -> Self {
        Self::Provider {
            status: None,
            message: e.to_string(),
        }
    }
}

/// A text-generating model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a text prompt.
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, LlmError>;

    /// Complete a prompt with a PDF attached (multimodal providers only).
    async fn generate_with_document(
        &self,
        _prompt: &str,
        _pdf: &[u8],
        _config: &ModelConfig,
    ) -> Result<String, LlmError> {
        Err(LlmError::Unsupported(
            "this model does not accept documents".to_string(),
        ))
    }

    /// Maximum characters of document text one prompt may carry.
    fn char_budget(&self) -> usize;

    fn accepts_documents(&self) -> bool {
        false
    }

    /// Whether credentials are present; unconfigured models are skipped.
    fn is_configured(&self) -> bool {
        true
    }
}

/// HTTP client for the configured LLM provider.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        // Per-call deadlines come from ModelConfig; this only bounds connects.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// Check if the LLM service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled || !self.config.has_credentials() {
            return false;
        }
        match self.config.provider {
            LlmProvider::Ollama => {
                let url = format!("{}/api/tags", self.config.endpoint);
                match self.client.get(&url).send().await {
                    Ok(resp) => resp.status().is_success(),
                    Err(_) => false,
                }
            }
            LlmProvider::OpenAI | LlmProvider::Gemini => true,
        }
    }

    fn ensure_configured(&self) -> Result<(), LlmError> {
        if !self.config.enabled {
            return Err(LlmError::NotConfigured("LLM is disabled".to_string()));
        }
        if !self.config.has_credentials() {
            return Err(LlmError::NotConfigured(format!(
                "no API key set for provider {}",
                self.config.provider.as_str()
            )));
        }
        Ok(())
    }

    /// One call with timeout and retries.
    async fn call(
        &self,
        prompt: &str,
        document: Option<&[u8]>,
        model_config: &ModelConfig,
    ) -> Result<String, LlmError> {
        self.ensure_configured()?;
        let limit = Duration::from_millis(model_config.timeout_ms);

        self.config
            .retry
            .run("llm call", LlmError::is_transient, || async move {
                let text = with_timeout(limit, self.dispatch(prompt, document, model_config))
                    .await
                    .map_err(|e| LlmError::Timeout(e.0))??;
                if text.trim().is_empty() {
                    return Err(LlmError::EmptyResponse);
                }
                Ok(text)
            })
            .await
    }

    async fn dispatch(
        &self,
        prompt: &str,
        document: Option<&[u8]>,
        model_config: &ModelConfig,
    ) -> Result<String, LlmError> {
        debug!(
            "LLM request to {} ({} prompt chars, document: {})",
            self.config.provider.as_str(),
            prompt.len(),
            document.is_some()
        );
        match (self.config.provider, document) {
            (LlmProvider::Ollama, None) => self.call_ollama(prompt, model_config).await,
            (LlmProvider::OpenAI, None) => self.call_openai(prompt, model_config).await,
            (LlmProvider::Gemini, doc) => self.call_gemini(prompt, doc, model_config).await,
            (provider, Some(_)) => Err(LlmError::Unsupported(format!(
                "{} does not accept documents",
                provider.as_str()
            ))),
        }
    }

    /// Call Ollama API with a prompt.
    async fn call_ollama(&self, prompt: &str, mc: &ModelConfig) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: mc.temperature,
                num_predict: mc.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp: OllamaResponse = send_json(self.client.post(&url).json(&request)).await?;
        Ok(resp.response)
    }

    /// Call an OpenAI-compatible chat completions endpoint.
    async fn call_openai(&self, prompt: &str, mc: &ModelConfig) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: mc.temperature,
            max_tokens: mc.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp: ChatResponse = send_json(builder).await?;
        Ok(resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Call Gemini `generateContent`, optionally with an inline PDF.
    async fn call_gemini(
        &self,
        prompt: &str,
        document: Option<&[u8]>,
        mc: &ModelConfig,
    ) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            LlmError::NotConfigured("GEMINI_API_KEY not set".to_string())
        })?;

        let mut parts = vec![GeminiPart::Text {
            text: prompt.to_string(),
        }];
        if let Some(pdf) = document {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: "application/pdf".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(pdf),
                },
            });
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiGenerationConfig {
                temperature: mc.temperature,
                max_output_tokens: mc.max_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, api_key
        );
        let resp: GeminiResponse = send_json(self.client.post(&url).json(&request)).await?;

        if let Some(error) = resp.error {
            return Err(LlmError::Provider {
                status: None,
                message: error.message,
            });
        }

        Ok(resp
            .candidates
            .and_then(|c| c.into_iter().next())
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}

/// Send a request and decode a JSON body, mapping HTTP failures to [`LlmError`].
///
/// A 429 with `Retry-After` sleeps for the advertised delay before the
/// error is returned to the retry loop.
async fn send_json<R: DeserializeOwned>(builder: RequestBuilder) -> Result<R, LlmError> {
    let resp = builder.send().await.map_err(LlmError::transport)?;
    let status = resp.status();

    if !status.is_success() {
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok());
            if let Some(wait) = parse_retry_after(retry_after) {
                warn!("LLM provider rate limited, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        let body = resp.text().await.unwrap_or_default();
        return Err(LlmError::Provider {
            status: Some(status.as_u16()),
            message: format!("HTTP {}: {}", status, body),
        });
    }

    resp.json()
        .await
        .map_err(|e| LlmError::transport(format!("malformed response: {}", e)))
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, LlmError> {
        self.call(prompt, None, config).await
    }

    async fn generate_with_document(
        &self,
        prompt: &str,
        pdf: &[u8],
        config: &ModelConfig,
    ) -> Result<String, LlmError> {
        if !self.accepts_documents() {
            return Err(LlmError::Unsupported(format!(
                "{} does not accept documents",
                self.config.provider.as_str()
            )));
        }
        self.call(prompt, Some(pdf), config).await
    }

    fn char_budget(&self) -> usize {
        self.config.char_budget()
    }

    fn accepts_documents(&self) -> bool {
        self.config.provider == LlmProvider::Gemini
    }

    fn is_configured(&self) -> bool {
        self.config.enabled && self.config.has_credentials()
    }
}
