//! Error types for inbox synchronization.

use crm_gateway::GatewayError;
use thiserror::Error;

/// Errors surfaced by the sync engine.
///
/// Read failures that leave the caches at their last known good state are
/// logged rather than returned, and stale responses are never errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operator has no valid credential; the application should redirect
    /// to sign-in.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Error from the CRM backend.
    #[error("gateway error: {0}")]
    Gateway(GatewayError),

    /// A send was attempted with no conversation open.
    #[error("no conversation is open")]
    NoOpenConversation,

    /// A send was attempted with blank content.
    #[error("message is empty")]
    EmptyMessage,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The push-event stream ended.
    #[error("event stream ended")]
    StreamEnded,
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        if err.is_auth() {
            SyncError::Unauthenticated
        } else {
            SyncError::Gateway(err)
        }
    }
}
