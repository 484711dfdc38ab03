//! Permissive decoder for inbound frames.
//!
//! The decoder sits on an untrusted network boundary: it never fails.
//! Malformed or unrecognized input maps to [`IncomingEvent::Ignore`] at
//! worst, and raw non-JSON text degrades to a plain incoming message.

use serde_json::{Map, Value};

use crate::clock::{NowFn, stamp};
use crate::message::{ChatMessage, Direction};
use crate::payload::generate_message_id;

/// Event decoded from one inbound frame.
///
/// Transient: produced here, consumed immediately by the connection shell,
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    /// A complete chat message.
    Message(ChatMessage),
    /// A backlog replay batch.
    History(Vec<ChatMessage>),
    /// Delivery confirmation for a previously sent user message.
    Ack {
        /// Id of the acknowledged message.
        id: String,
    },
    /// A partial streamed reply.
    StreamChunk {
        /// Stream id shared by all chunks of one reply.
        id: String,
        /// Chunk text, appended to any earlier chunks.
        text: String,
        /// ISO-8601 timestamp.
        at: String,
    },
    /// End of a streamed reply.
    StreamEnd {
        /// Stream id.
        id: String,
    },
    /// Frame carries nothing the client surfaces.
    Ignore,
}

/// Decode one wire frame.
///
/// Dispatch order: empty input, bare JSON string, tagged object, and
/// finally raw text for anything that is not JSON at all.
#[must_use]
pub fn parse_incoming(wire: &str, now: &NowFn) -> IncomingEvent {
    if wire.trim().is_empty() {
        return IncomingEvent::Ignore;
    }
    match serde_json::from_str::<Value>(wire) {
        Ok(Value::String(text)) => bare_text(&text, now),
        Ok(Value::Object(object)) => decode_object(&object, now),
        Ok(_) => IncomingEvent::Ignore,
        Err(_) => bare_text(wire, now),
    }
}

fn bare_text(text: &str, now: &NowFn) -> IncomingEvent {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return IncomingEvent::Ignore;
    }
    IncomingEvent::Message(ChatMessage {
        id: generate_message_id(),
        direction: Direction::Incoming,
        text: trimmed.to_string(),
        at: stamp(now),
    })
}

fn decode_object(object: &Map<String, Value>, now: &NowFn) -> IncomingEvent {
    let tag = object.get("type").and_then(Value::as_str).unwrap_or_default();

    if tag_is(tag, "pong") || tag_is(tag, "ping") {
        return IncomingEvent::Ignore;
    }
    if tag_is(tag, "history") {
        let Some(items) = object.get("items").and_then(Value::as_array) else {
            return IncomingEvent::Ignore;
        };
        let items: Vec<ChatMessage> = items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|item| normalize_message(item, now))
            .collect();
        if items.is_empty() {
            return IncomingEvent::Ignore;
        }
        return IncomingEvent::History(items);
    }
    if tag_is(tag, "ack") {
        return string_field(object, &["id", "messageId"])
            .map_or(IncomingEvent::Ignore, |id| IncomingEvent::Ack { id });
    }
    if tag_is(tag, "stream.chunk") || tag_is(tag, "message.chunk") {
        let id = string_field(object, &["streamId", "messageId", "id"]);
        let text = chunk_text(object, &["chunk", "delta", "text", "content"]);
        return match (id, text) {
            (Some(id), Some(text)) => IncomingEvent::StreamChunk {
                id,
                text,
                at: string_field(object, &["ts", "at"]).unwrap_or_else(|| stamp(now)),
            },
            _ => IncomingEvent::Ignore,
        };
    }
    if tag_is(tag, "stream.end") || tag_is(tag, "stream.done") || tag_is(tag, "message.done") {
        return string_field(object, &["streamId", "messageId", "id"])
            .map_or(IncomingEvent::Ignore, |id| IncomingEvent::StreamEnd { id });
    }
    if tag_is(tag, "error") {
        let Some(reason) = string_field(object, &["reason", "message", "content"]) else {
            return IncomingEvent::Ignore;
        };
        // Server-side errors are surfaced as chat messages, not failures.
        return IncomingEvent::Message(ChatMessage {
            id: generate_message_id(),
            direction: Direction::Incoming,
            text: reason,
            at: stamp(now),
        });
    }

    normalize_message(object, now).map_or(IncomingEvent::Ignore, IncomingEvent::Message)
}

/// Match a type tag against a dotted suffix, ignoring any vendor prefix:
/// `assistant.stream.chunk` and `stream.chunk` both match `stream.chunk`.
fn tag_is(tag: &str, suffix: &str) -> bool {
    tag.strip_suffix(suffix)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
}

/// Normalize one message-shaped object. Requires a non-blank body; id and
/// timestamp are defaulted when absent.
fn normalize_message(object: &Map<String, Value>, now: &NowFn) -> Option<ChatMessage> {
    let text = ["text", "message", "content"].iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(ToString::to_string)
    })?;
    let direction = object
        .get("direction")
        .and_then(Value::as_str)
        .map_or(Direction::Incoming, Direction::from_wire);
    Some(ChatMessage {
        id: string_field(object, &["id"]).unwrap_or_else(generate_message_id),
        direction,
        text,
        at: string_field(object, &["ts", "at"]).unwrap_or_else(|| stamp(now)),
    })
}

/// First usable value among `keys`: a non-blank string (trimmed) or a
/// number rendered as text.
fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-empty string among `keys`, preserved verbatim. Chunk text may
/// legitimately start or end with whitespace.
fn chunk_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn clock() -> NowFn {
        Arc::new(|| "2024-05-01T12:00:00Z".to_string())
    }

    #[test]
    fn empty_input_is_ignored() {
        let now = clock();
        assert_eq!(parse_incoming("", &now), IncomingEvent::Ignore);
        assert_eq!(parse_incoming("   ", &now), IncomingEvent::Ignore);
    }

    #[test]
    fn bare_json_string_is_a_message() {
        let now = clock();
        let IncomingEvent::Message(message) = parse_incoming("\"  hello  \"", &now) else {
            panic!("expected message");
        };
        assert_eq!(message.text, "hello");
        assert_eq!(message.direction, Direction::Incoming);
        assert_eq!(message.at, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn non_json_text_degrades_to_a_message() {
        let now = clock();
        let IncomingEvent::Message(message) = parse_incoming("plain text, not json", &now) else {
            panic!("expected message");
        };
        assert_eq!(message.text, "plain text, not json");
    }

    #[test]
    fn blank_bare_string_is_ignored() {
        let now = clock();
        assert_eq!(parse_incoming("\"   \"", &now), IncomingEvent::Ignore);
    }

    #[test]
    fn heartbeat_frames_are_not_surfaced() {
        let now = clock();
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.pong"}"#, &now),
            IncomingEvent::Ignore
        );
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.ping","ts":"x"}"#, &now),
            IncomingEvent::Ignore
        );
    }

    #[test]
    fn history_filters_unusable_items() {
        let now = clock();
        let wire = r#"{"type":"assistant.history","items":[
            {"id":"h1","text":"first","direction":"assistant","ts":"t1"},
            {"id":"h2"},
            {"id":"h3","text":"second","direction":"user"}
        ]}"#;
        let IncomingEvent::History(items) = parse_incoming(wire, &now) else {
            panic!("expected history");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "h1");
        assert_eq!(items[0].text, "first");
        assert_eq!(items[0].direction, Direction::Incoming);
        assert_eq!(items[0].at, "t1");
        assert_eq!(items[1].direction, Direction::Outgoing);
    }

    #[test]
    fn empty_history_is_ignored() {
        let now = clock();
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.history","items":[]}"#, &now),
            IncomingEvent::Ignore
        );
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.history"}"#, &now),
            IncomingEvent::Ignore
        );
    }

    #[test]
    fn ack_accepts_both_id_keys_and_tags() {
        let now = clock();
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.ack","id":"m1"}"#, &now),
            IncomingEvent::Ack { id: "m1".to_string() }
        );
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.user.ack","messageId":"m2"}"#, &now),
            IncomingEvent::Ack { id: "m2".to_string() }
        );
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.ack"}"#, &now),
            IncomingEvent::Ignore
        );
    }

    #[test]
    fn stream_chunk_accepts_field_aliases() {
        let now = clock();
        assert_eq!(
            parse_incoming(
                r#"{"type":"assistant.stream.chunk","streamId":"s1","chunk":"Hel"}"#,
                &now
            ),
            IncomingEvent::StreamChunk {
                id: "s1".to_string(),
                text: "Hel".to_string(),
                at: "2024-05-01T12:00:00Z".to_string(),
            }
        );
        assert_eq!(
            parse_incoming(
                r#"{"type":"assistant.message.chunk","messageId":"s1","delta":" lo","at":"t9"}"#,
                &now
            ),
            IncomingEvent::StreamChunk {
                id: "s1".to_string(),
                text: " lo".to_string(),
                at: "t9".to_string(),
            }
        );
    }

    #[test]
    fn stream_chunk_without_id_or_text_is_ignored() {
        let now = clock();
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.stream.chunk","chunk":"x"}"#, &now),
            IncomingEvent::Ignore
        );
        assert_eq!(
            parse_incoming(r#"{"type":"assistant.stream.chunk","streamId":"s1","chunk":""}"#, &now),
            IncomingEvent::Ignore
        );
    }

    #[test]
    fn stream_end_variants() {
        let now = clock();
        for tag in ["assistant.stream.end", "assistant.stream.done", "assistant.message.done"] {
            let wire = format!(r#"{{"type":"{tag}","streamId":"s1"}}"#);
            assert_eq!(
                parse_incoming(&wire, &now),
                IncomingEvent::StreamEnd { id: "s1".to_string() },
                "tag {tag}"
            );
        }
    }

    #[test]
    fn error_frame_becomes_incoming_message() {
        let now = clock();
        let IncomingEvent::Message(message) =
            parse_incoming(r#"{"type":"assistant.error","reason":"backend down"}"#, &now)
        else {
            panic!("expected message");
        };
        assert_eq!(message.text, "backend down");
        assert_eq!(message.direction, Direction::Incoming);

        assert_eq!(
            parse_incoming(r#"{"type":"assistant.error","reason":"  "}"#, &now),
            IncomingEvent::Ignore
        );
    }

    #[test]
    fn untagged_object_goes_through_the_normalizer() {
        let now = clock();
        let IncomingEvent::Message(message) =
            parse_incoming(r#"{"content":"hi there","direction":"user"}"#, &now)
        else {
            panic!("expected message");
        };
        assert_eq!(message.text, "hi there");
        assert_eq!(message.direction, Direction::Outgoing);
        assert!(!message.id.is_empty());
    }

    #[test]
    fn object_without_a_body_is_ignored() {
        let now = clock();
        assert_eq!(parse_incoming(r#"{"id":"m1"}"#, &now), IncomingEvent::Ignore);
        assert_eq!(parse_incoming("[1,2,3]", &now), IncomingEvent::Ignore);
        assert_eq!(parse_incoming("42", &now), IncomingEvent::Ignore);
    }

    #[test]
    fn unprefixed_type_tags_match() {
        let now = clock();
        assert_eq!(
            parse_incoming(r#"{"type":"ack","id":"m1"}"#, &now),
            IncomingEvent::Ack { id: "m1".to_string() }
        );
        // A tag that merely ends with the word does not match.
        let IncomingEvent::Message(message) =
            parse_incoming(r#"{"type":"playback","id":"m1","text":"x"}"#, &now)
        else {
            panic!("expected message");
        };
        assert_eq!(message.text, "x");
    }

    #[test]
    fn normalizer_keeps_numeric_ids() {
        let now = clock();
        let IncomingEvent::Message(message) =
            parse_incoming(r#"{"id":17,"text":"numbered"}"#, &now)
        else {
            panic!("expected message");
        };
        assert_eq!(message.id, "17");
    }
}
