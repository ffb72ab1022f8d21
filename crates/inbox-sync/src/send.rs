//! Optimistic send pipeline.
//!
//! A send is inserted into the open conversation before any network round
//! trip, then resolved to exactly one terminal state. There is no
//! cancellation once the request is issued.

use std::time::{SystemTime, UNIX_EPOCH};

use crm_gateway::{
    AckState, Channel, Direction, GatewayError, Message, SendReceipt, SendRequest,
};

use crate::selection::ScrollCommand;

/// Where a send stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    /// Inserted locally, request in flight.
    Optimistic,
    Confirmed,
    Failed,
}

/// A send that has been inserted locally and not yet resolved.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub provisional_id: i64,
    pub request: SendRequest,
    /// The provisional message as inserted.
    pub message: Message,
    /// How the viewport should follow the insertion.
    pub scroll: ScrollCommand,
}

impl PendingSend {
    pub fn phase(&self) -> SendPhase {
        SendPhase::Optimistic
    }

    pub fn customer_id(&self) -> &str {
        &self.request.customer_id
    }

    /// Resolve against the network result.
    pub fn resolve(self, result: Result<SendReceipt, GatewayError>) -> SendOutcome {
        match result {
            Ok(receipt) => SendOutcome::Confirmed {
                provisional_id: self.provisional_id,
                customer_id: self.request.customer_id,
                receipt,
            },
            Err(error) => SendOutcome::Failed {
                provisional_id: self.provisional_id,
                customer_id: self.request.customer_id,
                content: self.request.content,
                error,
            },
        }
    }
}

/// Terminal state of a send.
#[derive(Debug)]
pub enum SendOutcome {
    Confirmed {
        provisional_id: i64,
        customer_id: String,
        receipt: SendReceipt,
    },
    Failed {
        provisional_id: i64,
        customer_id: String,
        content: String,
        error: GatewayError,
    },
}

impl SendOutcome {
    pub fn phase(&self) -> SendPhase {
        match self {
            SendOutcome::Confirmed { .. } => SendPhase::Confirmed,
            SendOutcome::Failed { .. } => SendPhase::Failed,
        }
    }

    pub fn provisional_id(&self) -> i64 {
        match self {
            SendOutcome::Confirmed { provisional_id, .. }
            | SendOutcome::Failed { provisional_id, .. } => *provisional_id,
        }
    }

    pub fn customer_id(&self) -> &str {
        match self {
            SendOutcome::Confirmed { customer_id, .. }
            | SendOutcome::Failed { customer_id, .. } => customer_id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SendOutcome::Confirmed { .. })
    }
}

/// Hands out provisional message ids.
///
/// Ids are the negated current time in milliseconds, forced strictly
/// decreasing so two sends in the same millisecond never collide. Server
/// ids are positive, so the two spaces never overlap.
#[derive(Debug, Default)]
pub struct ProvisionalIds {
    last: i64,
}

impl ProvisionalIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> i64 {
        let candidate = -(now_millis().min(i64::MAX as u64) as i64);
        let id = candidate.min(self.last - 1);
        self.last = id;
        id
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Build the locally inserted copy of an outbound message.
pub fn provisional_message(
    id: i64,
    customer_id: &str,
    content: &str,
    channel: Channel,
    timestamp: u64,
) -> Message {
    Message {
        id,
        customer_id: customer_id.to_string(),
        content: content.to_string(),
        direction: Direction::Outbound,
        timestamp,
        channel,
        ack_state: AckState::SentUnconfirmed,
    }
}
