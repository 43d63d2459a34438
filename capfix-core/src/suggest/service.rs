//! Boundary to the external generative text service.
//!
//! The pipeline only ever sees [`GenerativeService`]; the HTTP client lives in
//! `openai.rs` and tests substitute scripted doubles. Replies are decoded
//! into the typed shapes below, and a shape mismatch fails the call.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// One structured chat request expecting a JSON object back.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// A chat-style generative backend that answers with a JSON object.
///
/// Implementations need not handle deadlines or cancellation; the pipeline
/// wraps every call with both.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Sends `request` and returns the decoded JSON object from the reply.
    ///
    /// # Errors
    ///
    /// Any transport failure, non-success status, or non-JSON reply.
    async fn complete_json(&self, request: ChatRequest) -> Result<Value, ServiceError>;
}

/// `{"segments": [{"index", "severity", "reason", "confidence"}]}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiagnosisItem {
    pub index: u32,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// `{"indices": [..]}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankingReply {
    pub indices: Vec<u32>,
}

/// `{"segments": [{"index", "rewrite", "confidence", "notes"}]}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewriteItem {
    pub index: u32,
    #[serde(default)]
    pub rewrite: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Decodes a `segments` array, skipping entries that do not fit `T`.
///
/// # Errors
///
/// `MalformedResponse` when the body is not an object with a `segments` array.
pub fn decode_segments<T: DeserializeOwned>(body: Value) -> Result<Vec<T>, ServiceError> {
    let Value::Object(mut map) = body else {
        return Err(ServiceError::MalformedResponse("expected a JSON object".into()));
    };
    let Some(Value::Array(items)) = map.remove("segments") else {
        return Err(ServiceError::MalformedResponse("missing `segments` array".into()));
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if decoded.len() < total {
        tracing::debug!(skipped = total - decoded.len(), "dropped malformed segment entries");
    }
    Ok(decoded)
}

/// Decodes an `indices` reply.
///
/// # Errors
///
/// `MalformedResponse` when `indices` is missing or not an array of integers.
pub fn decode_ranking(body: Value) -> Result<RankingReply, ServiceError> {
    serde_json::from_value(body).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

/// Pulls a JSON object out of model output: the whole text if it parses,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
