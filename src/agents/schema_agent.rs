//! LLM-backed field extraction driven by an agent's field list.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{AgentError, AgentKind, MetadataAgent};
use crate::llm::prompts::{render, FIELD_EXTRACTION_PROMPT};
use crate::llm::{extract_json_object, truncate_chars, LanguageModel, ModelConfig};
use crate::registry::DocumentTypeConfig;

pub struct SchemaAgent {
    kind: AgentKind,
    model: Arc<dyn LanguageModel>,
    model_config: ModelConfig,
}

impl SchemaAgent {
    pub fn new(kind: AgentKind, model: Arc<dyn LanguageModel>, model_config: ModelConfig) -> Self {
        Self {
            kind,
            model,
            model_config,
        }
    }

    fn field_list(&self, config: &DocumentTypeConfig) -> String {
        self.kind
            .field_names(config)
            .iter()
            .map(|name| {
                let description = self
                    .kind
                    .fields()
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| f.description)
                    .unwrap_or("required");
                format!("- {}: {}", name, description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl MetadataAgent for SchemaAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn extract(&self, text: &str, config: &DocumentTypeConfig) -> Result<Value, AgentError> {
        let (content, truncated) = truncate_chars(text, self.model.char_budget());
        if truncated {
            debug!(
                "{} agent: text truncated to {} chars",
                self.kind,
                self.model.char_budget()
            );
        }

        let prompt = render(
            FIELD_EXTRACTION_PROMPT,
            &[
                ("type_name", &config.display_name),
                ("fields", &self.field_list(config)),
                ("content", content),
            ],
        );

        let response = self.model.generate(&prompt, &self.model_config).await?;
        extract_json_object(&response).ok_or_else(|| {
            AgentError::MalformedResponse(format!(
                "{} agent returned no JSON object",
                self.kind
            ))
        })
    }
}
