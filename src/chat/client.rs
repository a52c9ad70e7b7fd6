use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::api::models::{ApiResponse, ChatRequest, ProbeResponse, SettingsPayload, WireMessage};
use crate::chat::model::{ChatSettings, Message};

pub const GENERIC_SEND_ERROR: &str = "Failed to send message";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
    #[error("Malformed relay response: {0}")]
    Decode(String),
}

/// The one outbound call the chat controller makes.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(&self, messages: &[Message], settings: &ChatSettings) -> Result<String, ClientError>;
}

/// Talks to the relay's `/api/chat` route. One attempt per call.
pub struct HttpChatClient {
    client: Client,
    base_url: String,
}

impl HttpChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    pub async fn probe(&self) -> Result<ProbeResponse, ClientError> {
        let response = self
            .client
            .get(self.chat_url())
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::Rejected(format!("relay answered {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

pub fn to_request(messages: &[Message], settings: &ChatSettings) -> ChatRequest {
    ChatRequest {
        messages: Some(
            messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        ),
        settings: Some(SettingsPayload {
            system_prompt: Some(settings.system_prompt.clone()),
            model: Some(settings.model.clone()),
            temperature: settings.temperature,
        }),
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn send(&self, messages: &[Message], settings: &ChatSettings) -> Result<String, ClientError> {
        debug!(messages = messages.len(), url = %self.chat_url(), "sending chat request");

        let response = self
            .client
            .post(self.chat_url())
            .json(&to_request(messages, settings))
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        // The envelope is authoritative; the status code only backs it up.
        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if !envelope.success {
            return Err(ClientError::Rejected(
                envelope.error.unwrap_or_else(|| GENERIC_SEND_ERROR.to_string()),
            ));
        }

        Ok(envelope.message.unwrap_or_default())
    }
}
