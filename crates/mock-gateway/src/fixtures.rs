//! Builders for customers, messages and push events used across tests.

use crm_gateway::{
    AckState, Channel, CustomerSummary, CustomerUpdate, Direction, EventEnvelope, Message,
    SyncEvent,
};

/// A customer summary with a preview and timestamp.
pub fn customer(id: &str, name: &str) -> CustomerSummary {
    CustomerSummary::new(id, name)
}

/// A customer summary as carried by an `inbound_message` event.
pub fn customer_with(id: &str, preview: &str, timestamp: u64, unread: u32) -> CustomerSummary {
    CustomerSummary {
        last_message_preview: preview.to_string(),
        last_message_timestamp: timestamp,
        unread_count: unread,
        ..CustomerSummary::new(id, id)
    }
}

/// A confirmed inbound message.
pub fn inbound(id: i64, customer_id: &str, content: &str, timestamp: u64) -> Message {
    Message {
        id,
        customer_id: customer_id.to_string(),
        content: content.to_string(),
        direction: Direction::Inbound,
        timestamp,
        channel: Channel::Whatsapp,
        ack_state: AckState::DeliveredToRecipient,
    }
}

/// A confirmed outbound message.
pub fn outbound(id: i64, customer_id: &str, content: &str, timestamp: u64, ack: AckState) -> Message {
    Message {
        direction: Direction::Outbound,
        ack_state: ack,
        ..inbound(id, customer_id, content, timestamp)
    }
}

/// An `inbound_message` push event.
pub fn inbound_event(tenant: &str, message: Message, unread: u32) -> EventEnvelope {
    let customer = customer_with(
        &message.customer_id,
        &message.content,
        message.timestamp,
        unread,
    );
    EventEnvelope::new(tenant, SyncEvent::InboundMessage { message, customer })
}

/// A `customer_update` push event.
pub fn update_event(tenant: &str, update: CustomerUpdate) -> EventEnvelope {
    EventEnvelope::new(tenant, SyncEvent::CustomerUpdate { customer: update })
}

/// A `message_seen` push event.
pub fn seen_event(tenant: &str, customer_id: &str) -> EventEnvelope {
    EventEnvelope::new(
        tenant,
        SyncEvent::MessageSeen {
            customer_id: customer_id.to_string(),
        },
    )
}
