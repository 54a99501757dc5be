//! Error types and handling
//!
//! This module provides the error type shared by the gateway engine and its
//! clients. Every error implements `GatewayErrorExt`, which provides a
//! user-facing hint and indicates whether retrying the same request can help.
//!
//! # Security
//!
//! Error messages never carry provider credentials. Upstream error bodies are
//! passed through as-is, so providers must not echo API keys back.

use thiserror::Error;

/// Trait for gateway error extensions
pub trait GatewayErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains secrets
    /// or internal paths.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the caller without changing the
    /// request or the gateway configuration.
    fn is_recoverable(&self) -> bool;
}

/// Main gateway error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Validation**: A chat request rejected before any dispatch
/// - **Database**: Conversation store failures
/// - **Provider**: Upstream model endpoint failures
/// - **Identity**: Owner-scoped endpoints called without an owner
///
/// # Examples
///
/// ```
/// use sdk::errors::{GatewayError, GatewayErrorExt};
///
/// let error = GatewayError::EmptyMessage;
/// assert!(!error.is_recoverable());
/// assert!(error.is_validation());
///
/// let error = GatewayError::Provider("connection reset".to_string());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum GatewayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Validation errors
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("No valid models selected")]
    NoValidModels,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Identity errors
    #[error("Owner identity required")]
    OwnerRequired,

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Returns true for errors raised while validating an inbound request,
    /// before any backend was contacted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessage | Self::NoValidModels | Self::InvalidRequest(_)
        )
    }
}

impl GatewayErrorExt for GatewayError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::EmptyMessage => "Type a question before sending",
            Self::NoValidModels => "Select at least one of the available models",
            Self::InvalidRequest(_) => "The request body is malformed",

            Self::OwnerRequired => "Sign in to access conversation history",

            Self::Database(_) => "Conversation storage failed. Try again shortly",
            Self::NotFound(_) => "The requested item does not exist",

            Self::Provider(_) => "Model provider unavailable. Check your API key and network",
            Self::MissingCredential(_) => "Set the provider API key in the environment or .env",

            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::EmptyMessage
            | Self::NoValidModels
            | Self::InvalidRequest(_)
            | Self::OwnerRequired
            | Self::NotFound(_)
            | Self::MissingCredential(_) => false,

            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_flagged() {
        assert!(GatewayError::EmptyMessage.is_validation());
        assert!(GatewayError::NoValidModels.is_validation());
        assert!(GatewayError::InvalidRequest("bad json".into()).is_validation());
        assert!(!GatewayError::Provider("down".into()).is_validation());
        assert!(!GatewayError::OwnerRequired.is_validation());
    }

    #[test]
    fn test_recoverability() {
        assert!(!GatewayError::EmptyMessage.is_recoverable());
        assert!(!GatewayError::MissingCredential("HF_TOKEN".into()).is_recoverable());
        assert!(GatewayError::Network("reset".into()).is_recoverable());
        assert!(GatewayError::Database("locked".into()).is_recoverable());
    }

    #[test]
    fn test_hints_do_not_leak_details() {
        let error = GatewayError::Provider("Bearer hf_secret_value".into());
        assert!(!error.user_hint().contains("hf_secret_value"));
    }
}
