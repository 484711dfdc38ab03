//! Transcript entry type.

use assistant_chat_protocol::{ChatMessage, Direction};
use serde::{Deserialize, Serialize};

/// One entry in the chat transcript.
///
/// Identity is `id`, unique within the log. `pending` means "sent but not
/// yet acknowledged" for outgoing entries and "still streaming" for
/// incoming ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Unique entry id.
    pub id: String,
    /// Message direction.
    pub direction: Direction,
    /// Message body.
    pub text: String,
    /// ISO-8601 timestamp.
    pub at: String,
    /// Delivery (outgoing) or streaming (incoming) still in flight.
    pub pending: bool,
}

impl TranscriptEntry {
    /// An outgoing entry for a just-sent user message, pending until
    /// delivery is confirmed.
    #[must_use]
    pub fn outgoing(id: impl Into<String>, text: impl Into<String>, at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: Direction::Outgoing,
            text: text.into(),
            at: at.into(),
            pending: true,
        }
    }

    /// An entry for a complete (non-streaming) message, keeping the
    /// direction the wire reported.
    #[must_use]
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            direction: message.direction,
            text: message.text.clone(),
            at: message.at.clone(),
            pending: false,
        }
    }
}
