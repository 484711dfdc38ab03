//! Connection shell for the assistant chat client.
//!
//! Owns a single persistent duplex connection and keeps the transcript
//! consistent across drops, duplicated frames, and reconnects:
//! - `ChatShell` - the public handle (connect / disconnect / send / observe)
//! - `Transport` / `TransportFactory` - the seam to the network primitive
//! - `ShellConfig` - endpoint, auth, backoff, and heartbeat settings
//!
//! A real WebSocket transport is available behind the `tungstenite`
//! feature; tests substitute an in-memory fake through the factory.

pub mod backoff;
pub mod config;
pub mod shell;
pub mod state;
pub mod transport;

#[cfg(feature = "tungstenite")]
pub mod websocket;

pub use config::{AuthTokenFn, ShellConfig};
pub use shell::ChatShell;
pub use state::{ConnectionStatus, ShellSnapshot};
pub use transport::{
    CloseEvent, ReadyState, Transport, TransportError, TransportFactory,
};

#[cfg(feature = "tungstenite")]
pub use websocket::WsTransportFactory;
