//! Normalized chat message as decoded from the wire.

use serde::{Deserialize, Serialize};

/// Direction of a chat message relative to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Authored remotely (assistant or server).
    Incoming,
    /// Authored by the local user.
    Outgoing,
}

impl Direction {
    /// Map a wire-level direction tag. `"user"` and `"outgoing"` mean
    /// outgoing; anything else is incoming.
    #[must_use]
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "user" | "outgoing" => Self::Outgoing,
            _ => Self::Incoming,
        }
    }
}

/// A single normalized chat message produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id (generated when the frame carries none).
    pub id: String,
    /// Message direction.
    pub direction: Direction,
    /// Message body.
    pub text: String,
    /// ISO-8601 timestamp.
    pub at: String,
}
