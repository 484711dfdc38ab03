//! WebSocket transport backed by tokio-tungstenite.
//!
//! `connect` returns immediately with a handle in the `Connecting` state; a
//! driver task performs the handshake and pumps frames, reporting outcomes
//! through the callback slots.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::transport::{
    CloseCallback, CloseEvent, ErrorCallback, MessageCallback, OpenCallback, ReadyState,
    Transport, TransportError, TransportFactory,
};

const RAW_CONNECTING: u8 = 0;
const RAW_OPEN: u8 = 1;
const RAW_CLOSING: u8 = 2;
const RAW_CLOSED: u8 = 3;

#[derive(Default)]
struct Hooks {
    on_open: Option<OpenCallback>,
    on_message: Option<MessageCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

struct Shared {
    state: AtomicU8,
    hooks: Mutex<Hooks>,
}

impl Shared {
    fn set_state(&self, raw: u8) {
        self.state.store(raw, Ordering::SeqCst);
    }

    fn fire_open(&self) {
        if let Ok(mut hooks) = self.hooks.lock() {
            if let Some(cb) = hooks.on_open.as_mut() {
                cb();
            }
        }
    }

    fn fire_message(&self, text: String) {
        if let Ok(mut hooks) = self.hooks.lock() {
            if let Some(cb) = hooks.on_message.as_mut() {
                cb(text);
            }
        }
    }

    fn fire_error(&self, message: String) {
        if let Ok(mut hooks) = self.hooks.lock() {
            if let Some(cb) = hooks.on_error.as_mut() {
                cb(message);
            }
        }
    }

    fn fire_close(&self, event: CloseEvent) {
        if let Ok(mut hooks) = self.hooks.lock() {
            if let Some(cb) = hooks.on_close.as_mut() {
                cb(event);
            }
        }
    }
}

enum WsCommand {
    Text(String),
    Close(Option<u16>, Option<String>),
}

/// One live WebSocket connection.
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<WsCommand>,
}

impl WsTransport {
    fn spawn(url: String) -> Self {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(RAW_CONNECTING),
            hooks: Mutex::new(Hooks::default()),
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(url, Arc::clone(&shared), outbound_rx));
        Self { shared, outbound: outbound_tx }
    }
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_raw(self.shared.state.load(Ordering::SeqCst))
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(WsCommand::Text(text.to_string()))
            .map_err(|_| TransportError::Send("socket task ended".to_string()))
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.shared.set_state(RAW_CLOSING);
        let _ = self
            .outbound
            .send(WsCommand::Close(code, reason.map(ToString::to_string)));
    }

    fn set_on_open(&mut self, callback: Option<OpenCallback>) {
        if let Ok(mut hooks) = self.shared.hooks.lock() {
            hooks.on_open = callback;
        }
    }

    fn set_on_message(&mut self, callback: Option<MessageCallback>) {
        if let Ok(mut hooks) = self.shared.hooks.lock() {
            hooks.on_message = callback;
        }
    }

    fn set_on_error(&mut self, callback: Option<ErrorCallback>) {
        if let Ok(mut hooks) = self.shared.hooks.lock() {
            hooks.on_error = callback;
        }
    }

    fn set_on_close(&mut self, callback: Option<CloseCallback>) {
        if let Ok(mut hooks) = self.shared.hooks.lock() {
            hooks.on_close = callback;
        }
    }
}

async fn drive(
    url: String,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<WsCommand>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(error) => {
            tracing::debug!(%error, "websocket handshake failed");
            shared.set_state(RAW_CLOSED);
            shared.fire_error(error.to_string());
            shared.fire_close(CloseEvent {
                clean: false,
                code: None,
                reason: Some(error.to_string()),
            });
            return;
        }
    };
    shared.set_state(RAW_OPEN);
    shared.fire_open();

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(WsCommand::Text(text)) => {
                    if let Err(error) = sink.send(Message::Text(text)).await {
                        shared.set_state(RAW_CLOSED);
                        shared.fire_error(error.to_string());
                        shared.fire_close(CloseEvent {
                            clean: false,
                            code: None,
                            reason: Some(error.to_string()),
                        });
                        return;
                    }
                }
                Some(WsCommand::Close(code, reason)) => {
                    let frame = CloseFrame {
                        code: code.map_or(CloseCode::Normal, CloseCode::from),
                        reason: reason.unwrap_or_default().into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    shared.set_state(RAW_CLOSED);
                    shared.fire_close(CloseEvent { clean: true, code, reason: None });
                    return;
                }
                None => {
                    // Handle dropped: close quietly.
                    let _ = sink.send(Message::Close(None)).await;
                    shared.set_state(RAW_CLOSED);
                    return;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.fire_message(text),
                Some(Ok(Message::Binary(data))) => {
                    if let Ok(text) = String::from_utf8(data) {
                        shared.fire_message(text);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    shared.set_state(RAW_CLOSED);
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), Some(f.reason.to_string())))
                        .unwrap_or((None, None));
                    shared.fire_close(CloseEvent { clean: true, code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    shared.set_state(RAW_CLOSED);
                    shared.fire_error(error.to_string());
                    shared.fire_close(CloseEvent {
                        clean: false,
                        code: None,
                        reason: Some(error.to_string()),
                    });
                    return;
                }
                None => {
                    shared.set_state(RAW_CLOSED);
                    shared.fire_close(CloseEvent {
                        clean: false,
                        code: None,
                        reason: Some("connection reset".to_string()),
                    });
                    return;
                }
            },
        }
    }
}

/// Produces [`WsTransport`] handles. Requires a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(WsTransport::spawn(url.to_string())))
    }
}
