//! API error type and JSON error body
//!
//! Every failed request gets `{"error": ..., "hint": ...}` with a status
//! derived from the underlying `GatewayError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sdk::errors::{GatewayError, GatewayErrorExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub hint: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                hint: hint.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn store_disabled() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Conversation storage is disabled",
            "Enable memory in config.toml to keep history",
        )
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        GatewayError::OwnerRequired => StatusCode::UNAUTHORIZED,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Provider(_) | GatewayError::Network(_) => StatusCode::BAD_GATEWAY,
        GatewayError::MissingCredential(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string(), err.user_hint())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Database(format!("{:#}", err)).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(GatewayError::EmptyMessage).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(GatewayError::NoValidModels).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(GatewayError::OwnerRequired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(GatewayError::NotFound("turn 3".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(GatewayError::Database("locked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_body_carries_message_and_hint() {
        let err = ApiError::from(GatewayError::EmptyMessage);
        assert_eq!(err.body.error, "Message cannot be empty");
        assert_eq!(err.body.hint, "Type a question before sending");
    }
}
