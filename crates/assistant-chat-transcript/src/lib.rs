//! Pure transcript reducer for the assistant chat client.
//!
//! The transcript is an ordered, bounded log of chat entries. Every
//! function here is a pure fold: `(log, input, capacity) -> new log`, with
//! no I/O, no timers, and no mutation of the input slice. The connection
//! shell owns the log and replaces it with each reducer result.

pub mod entry;
pub mod reducer;

pub use entry::TranscriptEntry;
pub use reducer::{
    append_limited, apply_stream_chunk, mark_pending, merge_history, upsert_incoming_message,
};

/// Default bound on transcript and outbound-queue length.
pub const DEFAULT_CAPACITY: usize = 120;
