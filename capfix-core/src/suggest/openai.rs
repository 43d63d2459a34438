//! `GenerativeService` over an OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::ServiceError;

use super::service::{extract_json, ChatMessage, ChatRequest, GenerativeService};

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for the chat-completions API.
///
/// Construct once and share (behind an `Arc`) across pipeline runs; the
/// inner `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), endpoint, api_key)
    }

    pub fn with_http_client(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Builds a client from config, reading the key from the configured
    /// environment variable.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` when the variable is unset or blank.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ServiceError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(config.endpoint.clone(), api_key))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerativeService for OpenAiClient {
    async fn complete_json(&self, request: ChatRequest) -> Result<Value, ServiceError> {
        let body = CompletionBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status: status.as_u16(), body });
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("reply has no message content".into()))?;

        extract_json(&content)
            .ok_or_else(|| ServiceError::MalformedResponse("reply content is not JSON".into()))
    }
}
