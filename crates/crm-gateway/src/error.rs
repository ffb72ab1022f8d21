//! Error types for crm-gateway.

use thiserror::Error;

/// Errors that can occur when talking to the CRM backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credential is available, or the server rejected it (401/403).
    #[error("unauthenticated")]
    Unauthenticated,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status from the server.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// SSE stream error.
    #[error("SSE error: {0}")]
    Sse(String),

    /// A push payload parsed as JSON but is not a usable event.
    #[error("malformed event: {0}")]
    Decode(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether this error means the operator has to authenticate again.
    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Unauthenticated)
    }

    /// Whether this error concerns one payload rather than the connection.
    pub fn is_malformed(&self) -> bool {
        matches!(self, GatewayError::Json(_) | GatewayError::Decode(_))
    }

    /// Classify a failed status code.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => GatewayError::Unauthenticated,
            _ => GatewayError::Status { status, body },
        }
    }
}
