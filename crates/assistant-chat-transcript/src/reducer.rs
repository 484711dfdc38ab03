//! Pure fold functions over the transcript log.

use assistant_chat_protocol::{ChatMessage, Direction};

use crate::entry::TranscriptEntry;

/// Append `entry`, evicting the oldest entries so the result never exceeds
/// `capacity`. The append and the trim are one step: folding into an
/// already-full log yields exactly `capacity` entries with `entry` last.
#[must_use]
pub fn append_limited(
    log: &[TranscriptEntry],
    entry: TranscriptEntry,
    capacity: usize,
) -> Vec<TranscriptEntry> {
    let mut next = log.to_vec();
    next.push(entry);
    if next.len() > capacity {
        let excess = next.len() - capacity;
        next.drain(..excess);
    }
    next
}

/// Set the `pending` flag on the entry matching `id`. No-op when absent.
#[must_use]
pub fn mark_pending(log: &[TranscriptEntry], id: &str, pending: bool) -> Vec<TranscriptEntry> {
    log.iter()
        .map(|entry| {
            if entry.id == id {
                let mut entry = entry.clone();
                entry.pending = pending;
                entry
            } else {
                entry.clone()
            }
        })
        .collect()
}

/// Merge a history batch, in item order. Deduplication is by `id` only:
/// an id already in the log keeps its first-written text even when a later
/// batch repeats it with different content.
#[must_use]
pub fn merge_history(
    log: &[TranscriptEntry],
    items: &[ChatMessage],
    capacity: usize,
) -> Vec<TranscriptEntry> {
    let mut next = log.to_vec();
    for item in items {
        if next.iter().any(|entry| entry.id == item.id) {
            continue;
        }
        next = append_limited(&next, TranscriptEntry::from_message(item), capacity);
    }
    next
}

/// Fold one streamed chunk into the log. Chunks for a known incoming entry
/// concatenate onto its text and keep it pending (the stream is still
/// open); an unknown id starts a fresh pending incoming entry.
#[must_use]
pub fn apply_stream_chunk(
    log: &[TranscriptEntry],
    id: &str,
    text: &str,
    at: &str,
    capacity: usize,
) -> Vec<TranscriptEntry> {
    let known = log
        .iter()
        .any(|entry| entry.id == id && entry.direction == Direction::Incoming);
    if known {
        return log
            .iter()
            .map(|entry| {
                if entry.id == id && entry.direction == Direction::Incoming {
                    let mut entry = entry.clone();
                    entry.text.push_str(text);
                    entry.at = at.to_string();
                    entry.pending = true;
                    entry
                } else {
                    entry.clone()
                }
            })
            .collect();
    }
    append_limited(
        log,
        TranscriptEntry {
            id: id.to_string(),
            direction: Direction::Incoming,
            text: text.to_string(),
            at: at.to_string(),
            pending: true,
        },
        capacity,
    )
}

/// Insert or replace a complete incoming message. A known id is rewritten
/// in place, preserving its position in the log; an unknown id appends.
#[must_use]
pub fn upsert_incoming_message(
    log: &[TranscriptEntry],
    message: &ChatMessage,
    capacity: usize,
) -> Vec<TranscriptEntry> {
    if log.iter().any(|entry| entry.id == message.id) {
        return log
            .iter()
            .map(|entry| {
                if entry.id == message.id {
                    TranscriptEntry::from_message(message)
                } else {
                    entry.clone()
                }
            })
            .collect();
    }
    append_limited(log, TranscriptEntry::from_message(message), capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, text: &str) -> TranscriptEntry {
        TranscriptEntry {
            id: id.to_string(),
            direction: Direction::Incoming,
            text: text.to_string(),
            at: "t0".to_string(),
            pending: false,
        }
    }

    fn message(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            direction: Direction::Incoming,
            text: text.to_string(),
            at: "t0".to_string(),
        }
    }

    #[test]
    fn append_limited_keeps_the_last_capacity_entries() {
        let mut log = Vec::new();
        for n in 0..10 {
            log = append_limited(&log, entry(&format!("m{n}"), "x"), 4);
        }
        assert_eq!(log.len(), 4);
        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["m6", "m7", "m8", "m9"]);
    }

    #[test]
    fn append_limited_on_a_full_log_is_one_step() {
        let log = vec![entry("a", "1"), entry("b", "2"), entry("c", "3")];
        let next = append_limited(&log, entry("d", "4"), 3);
        assert_eq!(next.len(), 3);
        assert_eq!(next.last().unwrap().id, "d");
        assert_eq!(next[0].id, "b");
        // Input untouched.
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].id, "a");
    }

    #[test]
    fn append_limited_zero_capacity_yields_empty() {
        let next = append_limited(&[], entry("a", "1"), 0);
        assert!(next.is_empty());
    }

    #[test]
    fn mark_pending_is_a_noop_for_unknown_ids() {
        let log = vec![entry("a", "1")];
        let next = mark_pending(&log, "missing", true);
        assert_eq!(next, log);
    }

    #[test]
    fn mark_pending_flips_only_the_match() {
        let mut a = entry("a", "1");
        a.pending = true;
        let log = vec![a, entry("b", "2")];
        let next = mark_pending(&log, "a", false);
        assert!(!next[0].pending);
        assert!(!next[1].pending);
        assert_eq!(next[0].text, "1");
    }

    #[test]
    fn merge_history_is_idempotent() {
        let items = vec![message("h1", "one"), message("h2", "two")];
        let once = merge_history(&[], &items, 10);
        let twice = merge_history(&once, &items, 10);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn merge_history_first_write_wins() {
        let log = merge_history(&[], &[message("h1", "original")], 10);
        let next = merge_history(&log, &[message("h1", "rewritten")], 10);
        assert_eq!(next[0].text, "original");
    }

    #[test]
    fn merge_history_appends_in_item_order() {
        let log = vec![entry("a", "1")];
        let next = merge_history(&log, &[message("h1", "x"), message("h2", "y")], 10);
        let ids: Vec<&str> = next.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "h1", "h2"]);
        assert!(!next[1].pending);
    }

    #[test]
    fn stream_chunks_accumulate_text() {
        let log = apply_stream_chunk(&[], "s1", "Hello ", "t1", 10);
        let log = apply_stream_chunk(&log, "s1", "world", "t2", 10);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "Hello world");
        assert_eq!(log[0].at, "t2");
        assert!(log[0].pending);

        let single = apply_stream_chunk(&[], "s1", "Hello world", "t2", 10);
        assert_eq!(single[0].text, log[0].text);
    }

    #[test]
    fn stream_chunk_ignores_outgoing_entries_with_same_id() {
        let log = vec![TranscriptEntry::outgoing("s1", "mine", "t0")];
        let next = apply_stream_chunk(&log, "s1", "their reply", "t1", 10);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].text, "mine");
        assert_eq!(next[1].text, "their reply");
        assert_eq!(next[1].direction, Direction::Incoming);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let log = vec![entry("a", "old"), entry("b", "2")];
        let next = upsert_incoming_message(&log, &message("a", "new"), 10);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].id, "a");
        assert_eq!(next[0].text, "new");
        assert_eq!(next[1].id, "b");
    }

    #[test]
    fn upsert_appends_unknown_ids() {
        let log = vec![entry("a", "1")];
        let next = upsert_incoming_message(&log, &message("b", "2"), 10);
        assert_eq!(next.len(), 2);
        assert_eq!(next[1].id, "b");
    }
}
