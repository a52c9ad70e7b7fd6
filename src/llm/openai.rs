use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::llm::{models::{ChatOptions, ChatResponse, Message}, LlmError, LlmProvider};

/// Any endpoint speaking the OpenAI chat-completions shape
/// (`{choices:[{message:{content}}]}`), authenticated with a bearer key and
/// a `CustomerId` header.
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    customer_id: String,
    default_model: String,
    default_system_prompt: String,
    default_temperature: f64,
}

impl OpenAiCompatibleProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            customer_id: config.customer_id.clone(),
            default_model: config.default_model.clone(),
            default_system_prompt: config.default_system_prompt.clone(),
            default_temperature: config.default_temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let system = options
            .system_prompt
            .unwrap_or_else(|| self.default_system_prompt.clone());

        let mut final_messages: Vec<Message> = Vec::with_capacity(messages.len() + 1);
        final_messages.push(Message::system(system));
        final_messages.extend_from_slice(messages);

        let body = json!({
            "model": model,
            "messages": final_messages,
            "temperature": options.temperature.unwrap_or(self.default_temperature),
            "stream": false,
        });

        debug!(model, messages = final_messages.len(), "forwarding completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("CustomerId", &self.customer_id)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "completion provider returned an error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            error!(error = %e, "completion payload is not JSON");
            LlmError::UnexpectedResponse
        })?;

        let content = match json["choices"][0]["message"]["content"].as_str() {
            Some(content) => content.to_string(),
            None => {
                error!(payload = %json, "unexpected completion payload");
                return Err(LlmError::UnexpectedResponse);
            }
        };

        Ok(ChatResponse {
            content,
            model: model.to_string(),
        })
    }
}
