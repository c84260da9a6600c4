//! Language model access: provider client, prompt templates and response parsing.

mod client;
pub mod prompts;
mod response;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{LanguageModel, LlmClient, LlmConfig, LlmError, LlmProvider, ModelConfig};
pub use response::{extract_json_object, truncate_chars};
