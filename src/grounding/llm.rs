//! Language model capability and an OpenAI-compatible chat client

use crate::config::LlmConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Language model is not configured: {0}")]
    NotConfigured(String),

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Transient failures the user can retry as-is
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::EmptyResponse => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One part of a (possibly multimodal) message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(ChatRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, text)
    }

    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// Concatenated text parts
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ContentPart::Image { .. }))
    }
}

/// A complete chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Anything that can complete a chat
///
/// The production backend speaks the OpenAI chat-completions protocol;
/// tests substitute scripted models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError>;

    /// Whether image parts are accepted
    fn supports_images(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        Self::with_model(config, &config.model)
    }

    /// Same endpoint and credentials, different model (e.g. for vision)
    pub fn with_model(config: &LlmConfig, model: &str) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ModelError::NotConfigured(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                ))
            })?;

        // The HTTP timeout is a backstop; the answerer enforces its own
        Self::new(
            &config.base_url,
            api_key,
            model,
            Duration::from_secs(config.timeout_secs.saturating_mul(2)),
        )
    }

    fn format_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let content = if msg.has_image() {
                    let parts: Vec<Value> = msg
                        .parts
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text(text) => json!({"type": "text", "text": text}),
                            ContentPart::Image { mime_type, data } => json!({
                                "type": "image_url",
                                "image_url": {"url": data_url(mime_type, data)},
                            }),
                        })
                        .collect();
                    json!(parts)
                } else {
                    json!(msg.text_content())
                };
                json!({"role": msg.role.as_str(), "content": content})
            })
            .collect()
    }

    fn parse_response(body: &str) -> Result<String, ModelError> {
        let v: Value =
            serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let content = v["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": Self::format_messages(&request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        tracing::debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            self.model,
            url
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Transport(format!("request timed out: {}", e))
                } else {
                    ModelError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(text);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Self::parse_response(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// `data:` URL for an inline image
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}
