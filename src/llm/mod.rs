pub mod models;
pub mod openai;

use openai::OpenAiCompatibleProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use models::{ChatOptions, ChatResponse, Message};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Unexpected response from AI service")]
    UnexpectedResponse,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Model used when the caller does not pick one.
    fn default_model(&self) -> &str;

    /// Single non-streaming completion. The provider prepends the system
    /// prompt and fills unset options from its own defaults.
    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError>;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Arc<dyn LlmProvider> {
        Arc::new(OpenAiCompatibleProvider::from_config(&config.provider))
    }
}
