//! Observable connection state.

use assistant_chat_transcript::TranscriptEntry;
use serde::{Deserialize, Serialize};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Never connected.
    #[default]
    Idle,
    /// No endpoint configured; operations are no-ops.
    Disabled,
    /// Connection attempt in flight.
    Connecting,
    /// Connected and exchanging frames.
    Open,
    /// Local close in progress.
    Closing,
    /// Closed; no attempt is live or scheduled.
    Closed,
    /// A transport failure was recorded; a reconnect may be scheduled.
    Error,
}

/// Immutable view of the shell published after every state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShellSnapshot {
    /// Connection lifecycle state.
    pub status: ConnectionStatus,
    /// Most recent failure, if any.
    pub last_error: Option<String>,
    /// The bounded chat transcript.
    pub transcript: Vec<TranscriptEntry>,
    /// Entries whose delivery or streaming is still in flight.
    pub pending_count: usize,
    /// Outbound payloads waiting for an open socket.
    pub queued_count: usize,
}
