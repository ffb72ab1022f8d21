//! Operator-facing notifications queued by the store.

use std::fmt;

/// Something the operator should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A message may not have been delivered. The entry stays visible in
    /// the conversation, flagged as failed.
    SendFailed {
        customer_id: String,
        provisional_id: i64,
        content: String,
        reason: String,
    },
    /// The credential is missing or was rejected; sign in again.
    SessionExpired,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SendFailed {
                content, reason, ..
            } => write!(f, "Message \"{}\" may not have been sent: {}", content, reason),
            Notice::SessionExpired => write!(f, "Your session has expired. Please sign in again."),
        }
    }
}
