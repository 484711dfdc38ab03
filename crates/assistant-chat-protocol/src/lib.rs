//! Wire protocol for the assistant chat transport.
//!
//! This crate is the pure, stateless layer of the chat client:
//! - `OutboundPayload` - frames the client writes to the socket
//! - `IncomingEvent` - the closed set of events decoded from the socket
//! - `resolve_socket_url` - endpoint normalization (`http -> ws`, token)
//!
//! The encoder is strict (a payload that cannot be serialized is a caller
//! bug and surfaces as an error); the decoder is permissive and maps any
//! malformed network input to `IncomingEvent::Ignore`.

pub mod clock;
pub mod decode;
pub mod message;
pub mod payload;
pub mod url;

pub use clock::{NowFn, system_clock, wall_clock_now};
pub use decode::{IncomingEvent, parse_incoming};
pub use message::{ChatMessage, Direction};
pub use payload::{
    OutboundPayload, ProtocolError, UserMessage, create_heartbeat_payload, create_user_payload,
    generate_message_id, payload_to_wire,
};
pub use url::resolve_socket_url;
