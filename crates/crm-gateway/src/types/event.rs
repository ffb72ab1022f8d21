//! Push events delivered over the SSE channel.

use serde::{Deserialize, Serialize};

use super::customer::{CustomerSummary, CustomerUpdate};
use super::de;
use super::message::Message;
use crate::error::GatewayError;

/// A server-originated state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Some summary fields of a customer changed.
    CustomerUpdate { customer: CustomerUpdate },

    /// A customer sent a message.
    InboundMessage {
        message: Message,
        customer: CustomerSummary,
    },

    /// A conversation was read.
    MessageSeen {
        #[serde(alias = "customerId", deserialize_with = "de::string_or_number")]
        customer_id: String,
    },
}

impl SyncEvent {
    /// Customer the event is about.
    pub fn customer_id(&self) -> &str {
        match self {
            SyncEvent::CustomerUpdate { customer } => &customer.id,
            SyncEvent::InboundMessage { customer, .. } => &customer.id,
            SyncEvent::MessageSeen { customer_id } => customer_id,
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::CustomerUpdate { .. } => "customer_update",
            SyncEvent::InboundMessage { .. } => "inbound_message",
            SyncEvent::MessageSeen { .. } => "message_seen",
        }
    }
}

/// An event plus the tenant it was emitted for. On the wire this is a flat
/// object: `{"type": ..., ...payload, "tenantId": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(
        rename = "tenantId",
        alias = "tenant_id",
        deserialize_with = "de::string_or_number"
    )]
    pub tenant_id: String,

    #[serde(flatten)]
    pub event: SyncEvent,
}

impl EventEnvelope {
    pub fn new(tenant_id: impl Into<String>, event: SyncEvent) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            event,
        }
    }

    /// Parse one push payload.
    ///
    /// Inbound messages whose `customer_id` is missing inherit it from the
    /// accompanying customer record; a message that names a different
    /// customer than its record is rejected.
    pub fn decode(data: &str) -> Result<Self, GatewayError> {
        let mut envelope: EventEnvelope = serde_json::from_str(data)?;

        if envelope.tenant_id.is_empty() {
            return Err(GatewayError::Decode("empty tenant id".to_string()));
        }

        match &mut envelope.event {
            SyncEvent::InboundMessage { message, customer } => {
                if customer.id.is_empty() {
                    return Err(GatewayError::Decode("inbound message without customer".into()));
                }
                if message.customer_id.is_empty() {
                    message.customer_id = customer.id.clone();
                } else if message.customer_id != customer.id {
                    return Err(GatewayError::Decode(format!(
                        "message {} belongs to {} but event names {}",
                        message.id, message.customer_id, customer.id
                    )));
                }
            }
            SyncEvent::CustomerUpdate { customer } if customer.id.is_empty() => {
                return Err(GatewayError::Decode("customer update without id".into()));
            }
            _ => {}
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AckState, Direction};

    #[test]
    fn test_decode_inbound_message() {
        let envelope = EventEnvelope::decode(
            r#"{"type": "inbound_message", "tenantId": 3,
                "customer": {"id": "C1", "display_name": "Carla", "unread_count": 3,
                             "last_message_preview": "hi", "last_message_timestamp": 1000},
                "message": {"id": 501, "content": "hi", "direction": "inbound", "timestamp": 1000}}"#,
        )
        .unwrap();

        assert_eq!(envelope.tenant_id, "3");
        assert_eq!(envelope.event.kind(), "inbound_message");
        match envelope.event {
            SyncEvent::InboundMessage { message, customer } => {
                assert_eq!(message.customer_id, "C1");
                assert_eq!(message.direction, Direction::Inbound);
                assert_eq!(message.ack_state, AckState::SentUnconfirmed);
                assert_eq!(customer.unread_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_customer_update_and_seen() {
        let update = EventEnvelope::decode(
            r#"{"type": "customer_update", "tenant_id": "t1",
                "customer": {"id": "C2", "stage_id": 4}}"#,
        )
        .unwrap();
        assert_eq!(update.event.customer_id(), "C2");

        let seen =
            EventEnvelope::decode(r#"{"type": "message_seen", "tenantId": "t1", "customerId": 9}"#)
                .unwrap();
        assert_eq!(
            seen.event,
            SyncEvent::MessageSeen {
                customer_id: "9".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(EventEnvelope::decode("not json").is_err());
        assert!(EventEnvelope::decode(r#"{"type": "typing", "tenantId": "t1"}"#).is_err());
        assert!(
            EventEnvelope::decode(r#"{"type": "message_seen", "customerId": "C1"}"#).is_err(),
            "tenant id is mandatory"
        );
        assert!(EventEnvelope::decode(
            r#"{"type": "inbound_message", "tenantId": "t1",
                "customer": {"id": "C1"},
                "message": {"id": 1, "customer_id": "C2", "direction": "inbound"}}"#,
        )
        .is_err());
    }
}
