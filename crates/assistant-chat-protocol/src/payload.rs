//! Outbound frames and the strict encoder.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::{NowFn, stamp};

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload could not be serialized. This indicates a malformed
    /// payload construction, not a network condition.
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A user-authored message bound for the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Correlation id, shared with the transcript entry for this send.
    pub id: String,
    /// Message body.
    pub content: String,
    /// ISO-8601 send timestamp.
    pub ts: String,
}

/// Frame written to the socket, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundPayload {
    /// User-authored chat message.
    #[serde(rename = "assistant.user.message")]
    UserMessage(UserMessage),
    /// Keep-alive frame.
    #[serde(rename = "assistant.ping")]
    Heartbeat {
        /// ISO-8601 timestamp.
        ts: String,
    },
}

impl OutboundPayload {
    /// Correlation id of a user message; heartbeats carry none.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::UserMessage(message) => Some(&message.id),
            Self::Heartbeat { .. } => None,
        }
    }
}

/// Generate a collision-resistant message id.
#[must_use]
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build a user message payload for `text`.
#[must_use]
pub fn create_user_payload(text: &str, now: &NowFn) -> UserMessage {
    UserMessage {
        id: generate_message_id(),
        content: text.to_string(),
        ts: stamp(now),
    }
}

/// Build a heartbeat payload.
#[must_use]
pub fn create_heartbeat_payload(now: &NowFn) -> OutboundPayload {
    OutboundPayload::Heartbeat { ts: stamp(now) }
}

/// Serialize a payload to wire text.
///
/// # Errors
/// Returns `ProtocolError::Encode` when the payload cannot be represented
/// as JSON text.
pub fn payload_to_wire(payload: &OutboundPayload) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(payload)?)
}
