//! Conversation message types.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::de;

/// Which side of the conversation authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Delivery/read confirmation level of a message.
///
/// Variants are declared in increasing order so that `Ord` gives the
/// monotonic progression a confirmed message may only move forward along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckState {
    /// Handed to the backend, not yet confirmed by anything.
    #[default]
    SentUnconfirmed,
    /// Accepted by the channel provider.
    DeliveredUnconfirmed,
    /// Delivered to the recipient's device.
    DeliveredToRecipient,
    /// Opened by the recipient.
    ReadByRecipient,
}

impl AckState {
    /// Map the numeric ack levels used by messaging providers (0..=3).
    /// Anything above 3 (e.g. "played") is treated as read.
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=0 => AckState::SentUnconfirmed,
            1 => AckState::DeliveredUnconfirmed,
            2 => AckState::DeliveredToRecipient,
            _ => AckState::ReadByRecipient,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "sent_unconfirmed" | "pending" => Some(AckState::SentUnconfirmed),
            "delivered_unconfirmed" | "server" | "sent" => Some(AckState::DeliveredUnconfirmed),
            "delivered_to_recipient" | "delivered" | "device" => {
                Some(AckState::DeliveredToRecipient)
            }
            "read_by_recipient" | "read" | "played" => Some(AckState::ReadByRecipient),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for AckState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Level(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Level(level) => Ok(AckState::from_level(level)),
            Raw::Name(name) => AckState::from_name(&name)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown ack state: {name}"))),
        }
    }
}

/// Messaging channel a conversation runs over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    #[default]
    Whatsapp,
    Instagram,
    Messenger,
    Telegram,
    Sms,
    Email,
    /// A channel this client does not know about yet.
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Instagram => "instagram",
            Channel::Messenger => "messenger",
            Channel::Telegram => "telegram",
            Channel::Sms => "sms",
            Channel::Email => "email",
            Channel::Other(name) => name,
        }
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "whatsapp" => Channel::Whatsapp,
            "instagram" => Channel::Instagram,
            "messenger" | "facebook" => Channel::Messenger,
            "telegram" => Channel::Telegram,
            "sms" => Channel::Sms,
            "email" => Channel::Email,
            _ => Channel::Other(value),
        }
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        Channel::from(value.to_string())
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server id. Provisional (locally created) messages use negative ids.
    pub id: i64,

    /// Customer the conversation belongs to.
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub customer_id: String,

    /// Text content.
    #[serde(default)]
    pub content: String,

    pub direction: Direction,

    /// Milliseconds since epoch.
    #[serde(default)]
    pub timestamp: u64,

    #[serde(default)]
    pub channel: Channel,

    #[serde(default, alias = "ack")]
    pub ack_state: AckState,
}

impl Message {
    /// Whether this message was created locally and has no server id yet.
    pub fn is_provisional(&self) -> bool {
        self.id < 0
    }
}

/// Body of a send-message call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub customer_id: String,
    pub content: String,
    pub channel: Channel,
}

/// Server response to a send-message call. Backends differ in how much
/// they echo back, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(default)]
    pub timestamp: Option<u64>,

    #[serde(default, alias = "ack")]
    pub ack_state: Option<AckState>,
}
