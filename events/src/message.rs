use crate::event::RealtimeEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame received from the hub.
///
/// Exactly one tag is active per frame. Tags this client does not know are
/// parsed as [`ServerMessage::Unknown`] so that newer hubs can add frame kinds
/// without breaking older clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A domain event for the application.
    Event { event: RealtimeEvent },
    /// The hub confirmed a subscription.
    Subscribed { channel: String },
    /// The hub confirmed an unsubscription.
    Unsubscribed { channel: String },
    /// The hub reported a problem; the connection stays open.
    Error { error: String },
    /// Liveness signal, no payload.
    Heartbeat,
    /// Sent once after the hub accepted the handshake.
    Connected {
        #[serde(default)]
        data: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Event { .. } => "event",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::Unsubscribed { .. } => "unsubscribed",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Heartbeat => "heartbeat",
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Unknown => "unknown",
        }
    }
}

/// A frame sent to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientMessage {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        ClientMessage::Subscribe {
            channel: channel.into(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe {
            channel: channel.into(),
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
