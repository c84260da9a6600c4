//! Scripted model for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LanguageModel, LlmError, ModelConfig};

/// Replays queued responses in order and records every prompt it sees.
/// An exhausted queue answers with [`LlmError::EmptyResponse`].
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    pub prompts: Mutex<Vec<String>>,
    pub budget: usize,
    pub documents: bool,
    pub configured: bool,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            budget: 10_000,
            documents: false,
            configured: true,
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn with_documents(mut self) -> Self {
        self.documents = true;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _config: &ModelConfig) -> Result<String, LlmError> {
        self.next(prompt)
    }

    async fn generate_with_document(
        &self,
        prompt: &str,
        _pdf: &[u8],
        _config: &ModelConfig,
    ) -> Result<String, LlmError> {
        if !self.documents {
            return Err(LlmError::Unsupported("scripted".into()));
        }
        self.next(prompt)
    }

    fn char_budget(&self) -> usize {
        self.budget
    }

    fn accepts_documents(&self) -> bool {
        self.documents
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}
