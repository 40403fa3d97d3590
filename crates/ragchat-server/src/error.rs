//! Error types for the chat server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ragchat_core::RagError;
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the chat server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failure reported by the retrieval pipeline
    #[error(transparent)]
    Rag(#[from] RagError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid request format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body over the configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert ServerError to HTTP status code
impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Rag(err) => match err {
                RagError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                RagError::InvalidInput(_) | RagError::DocumentLoad(_) => StatusCode::BAD_REQUEST,
                RagError::Embedding(_) | RagError::Llm(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::InvalidRequest(_) | ServerError::MissingField(_) | ServerError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Rag(err) => match err {
                RagError::SessionNotFound(_) => "session_not_found",
                RagError::InvalidInput(_) => "invalid_input",
                RagError::DocumentLoad(_) => "document_load_error",
                RagError::Embedding(_) => "embedding_error",
                RagError::Llm(_) => "llm_error",
                RagError::Config(_) => "config_error",
                _ => "internal_error",
            },
            ServerError::Json(_) => "json_error",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::PayloadTooLarge(_) => "payload_too_large",
            ServerError::MissingField(_) => "missing_field",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed ({}): {}", status, self);
        } else {
            log::warn!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(json!({
                "error": self.error_type(),
                "details": self.to_string(),
                "timestamp": chrono::Utc::now()
            })),
        )
            .into_response()
    }
}
