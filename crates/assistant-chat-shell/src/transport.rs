//! Transport abstraction owned by the connection shell.
//!
//! The shell talks to the network through exactly one seam: a factory that
//! produces handles with a ready state, `send`/`close`, and four assignable
//! callback slots. Any concrete socket (a real WebSocket, an in-memory
//! fake) satisfies this.

use thiserror::Error;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket is not open for writes.
    #[error("socket is not open")]
    NotOpen,
    /// A connection attempt could not be started.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A write was attempted but failed.
    #[error("send failed: {0}")]
    Send(String),
}

/// Socket readiness, mirroring the usual WebSocket numeric states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Connection in progress.
    Connecting,
    /// Open for traffic.
    Open,
    /// Close in progress.
    Closing,
    /// Closed, or any unrecognized state.
    Closed,
}

impl ReadyState {
    /// Map a raw numeric ready state. Anything outside 0..=2 is closed.
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Close notification delivered through the `on_close` slot.
#[derive(Debug, Clone)]
pub struct CloseEvent {
    /// Whether the peer closed with a proper close handshake.
    pub clean: bool,
    /// Close code, when the transport reports one.
    pub code: Option<u16>,
    /// Close reason, when the transport reports one.
    pub reason: Option<String>,
}

/// Callback slot invoked when the socket opens.
pub type OpenCallback = Box<dyn FnMut() + Send>;
/// Callback slot invoked per inbound text frame.
pub type MessageCallback = Box<dyn FnMut(String) + Send>;
/// Callback slot invoked on a transport-level error.
pub type ErrorCallback = Box<dyn FnMut(String) + Send>;
/// Callback slot invoked when the socket closes.
pub type CloseCallback = Box<dyn FnMut(CloseEvent) + Send>;

/// One live socket handle, exclusively owned by the shell.
pub trait Transport: Send {
    /// Current readiness.
    fn ready_state(&self) -> ReadyState;

    /// Write one text frame.
    ///
    /// # Errors
    /// Returns an error when the socket is not open or the write fails.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the socket. Best-effort: implementations swallow close-time
    /// failures.
    fn close(&mut self, code: Option<u16>, reason: Option<&str>);

    /// Assign or clear the open callback.
    fn set_on_open(&mut self, callback: Option<OpenCallback>);
    /// Assign or clear the message callback.
    fn set_on_message(&mut self, callback: Option<MessageCallback>);
    /// Assign or clear the error callback.
    fn set_on_error(&mut self, callback: Option<ErrorCallback>);
    /// Assign or clear the close callback.
    fn set_on_close(&mut self, callback: Option<CloseCallback>);
}

/// Produces transport handles for the shell.
///
/// `connect` never blocks: it returns a handle whose open/fail outcome is
/// delivered later through the callbacks, or fails synchronously when the
/// attempt cannot even start.
pub trait TransportFactory: Send + Sync {
    /// Start a connection attempt to `url`.
    ///
    /// # Errors
    /// Returns an error when the attempt cannot be started at all.
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}
