//! LLM Provider Abstraction Layer
//!
//! Every backend in the registry is reached through an OpenAI-compatible
//! chat completions endpoint. The `LLMProvider` trait is the seam the gateway
//! core calls through, so tests can substitute scripted providers for the
//! HTTP one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod openai;
pub mod registry;

pub use openai::OpenAICompatibleProvider;
pub use registry::BackendRegistry;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One chat completion call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Upstream model name
    pub model: String,

    pub messages: Vec<Message>,

    /// Token cap; provider default when unset
    pub max_tokens: Option<u32>,

    pub frequency_penalty: Option<f32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            frequency_penalty: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai-compatible")
    fn name(&self) -> &str;

    /// Generate a completion and return its text content
    ///
    /// Whitespace-only content is reported as `LLMError::EmptyResponse`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let system_msg = Message::system("Context");
        assert_eq!(system_msg.role, MessageRole::System);
        assert_eq!(Message::assistant("Hi").role.to_string(), "assistant");
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(Message::user("test")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "test"}));
    }

    #[test]
    fn test_generation_request_builders() {
        let request = GenerationRequest::new("m", vec![Message::user("q")])
            .with_max_tokens(1500)
            .with_frequency_penalty(1.2);
        assert_eq!(request.max_tokens, Some(1500));
        assert_eq!(request.frequency_penalty, Some(1.2));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            LLMError::Timeout(Duration::from_secs(90)).to_string(),
            "Timeout after 90s"
        );
        assert_eq!(
            LLMError::Timeout(Duration::from_millis(250)).to_string(),
            "Timeout after 250ms"
        );
        assert_eq!(LLMError::EmptyResponse.to_string(), "Empty response");
    }
}
