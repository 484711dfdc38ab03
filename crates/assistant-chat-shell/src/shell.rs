//! The connection shell: owns the transport handle, the outbound queue,
//! the heartbeat and reconnect timers, and the transcript.
//!
//! All mutable state lives in [`ShellState`], owned by one spawned task
//! that drains a single event channel. Public operations, transport
//! callbacks, and timer fires all arrive as events on that channel, so
//! each handler runs to completion before the next event is processed and
//! no locking of the shared state is needed.

use std::collections::VecDeque;
use std::time::Duration;

use assistant_chat_protocol::{
    IncomingEvent, OutboundPayload, ProtocolError, create_heartbeat_payload, create_user_payload,
    parse_incoming, payload_to_wire,
};
use assistant_chat_transcript::{
    TranscriptEntry, append_limited, apply_stream_chunk, mark_pending, merge_history,
    upsert_incoming_message,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::backoff::reconnect_delay;
use crate::config::ShellConfig;
use crate::state::{ConnectionStatus, ShellSnapshot};
use crate::transport::{CloseEvent, ReadyState, Transport, TransportError};

/// Handle to a running connection shell.
///
/// Cheap to clone; all clones drive the same shell. When every handle is
/// dropped the shell task disconnects and exits.
#[derive(Clone)]
pub struct ChatShell {
    events: mpsc::UnboundedSender<ShellEvent>,
    watch_rx: watch::Receiver<ShellSnapshot>,
}

impl ChatShell {
    /// Spawn a shell task for `config`.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(config: ShellConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = watch::channel(ShellSnapshot::default());
        let state = ShellState {
            config,
            status: ConnectionStatus::Idle,
            last_error: None,
            reconnect_attempts: 0,
            wants_connection: false,
            transcript: Vec::new(),
            queue: VecDeque::new(),
            transport: None,
            generation: 0,
            events: events_tx.downgrade(),
            watch_tx,
            reconnect_timer: None,
            heartbeat_timer: None,
        };
        tokio::spawn(run(state, events_rx));
        Self { events: events_tx, watch_rx }
    }

    /// Start (or re-use) a connection attempt.
    ///
    /// Idempotent: returns `true` without a second attempt when a transport
    /// is already connecting or open. Returns `false` when unconfigured or
    /// when the attempt cannot be started.
    pub async fn connect(&self) -> bool {
        self.request(|reply| Command::Connect { reply }, false).await
    }

    /// Tear down the connection and stop reconnecting.
    pub async fn disconnect(&self, reason: Option<&str>) {
        let reason = reason.map(ToString::to_string);
        self.request(|reply| Command::Disconnect { reason, reply }, ()).await;
    }

    /// Accept a user message for delivery.
    ///
    /// Returns `false` only when `text` normalizes to empty. Once accepted
    /// the message is reflected in the transcript immediately and delivered
    /// now or after the next (re)connect.
    pub async fn send_user_message(&self, text: &str) -> bool {
        let text = text.to_string();
        self.request(|reply| Command::SendUserMessage { text, reply }, false)
            .await
    }

    /// Drop the transcript and any queued, undelivered messages.
    pub async fn clear_transcript(&self) {
        self.request(|reply| Command::ClearTranscript { reply }, ()).await;
    }

    /// Remove one transcript entry and its queued payload, if any.
    ///
    /// Returns `false` for a blank or unknown id.
    pub async fn remove_transcript_entry(&self, id: &str) -> bool {
        let id = id.to_string();
        self.request(|reply| Command::RemoveEntry { id, reply }, false).await
    }

    /// Current state, as seen after every event processed so far.
    pub async fn snapshot(&self) -> ShellSnapshot {
        self.request(Command::snapshot, ShellSnapshot::default()).await
    }

    /// Watch channel publishing a [`ShellSnapshot`] after each transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ShellSnapshot> {
        self.watch_rx.clone()
    }

    /// Disconnect and stop the shell task.
    pub async fn shutdown(&self) {
        self.request(|reply| Command::Shutdown { reply }, ()).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
        fallback: T,
    ) -> T {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .events
            .send(ShellEvent::Command(make(reply_tx)))
            .is_err()
        {
            return fallback;
        }
        reply_rx.await.unwrap_or(fallback)
    }
}

/// Public operation routed through the event channel.
enum Command {
    Connect { reply: oneshot::Sender<bool> },
    Disconnect { reason: Option<String>, reply: oneshot::Sender<()> },
    SendUserMessage { text: String, reply: oneshot::Sender<bool> },
    ClearTranscript { reply: oneshot::Sender<()> },
    RemoveEntry { id: String, reply: oneshot::Sender<bool> },
    Snapshot { reply: oneshot::Sender<ShellSnapshot> },
    Shutdown { reply: oneshot::Sender<()> },
}

impl Command {
    fn snapshot(reply: oneshot::Sender<ShellSnapshot>) -> Self {
        Self::Snapshot { reply }
    }
}

/// Everything the shell task reacts to.
enum ShellEvent {
    Command(Command),
    Transport { generation: u64, event: TransportEvent },
    ReconnectElapsed { generation: u64 },
    HeartbeatTick { generation: u64 },
}

/// Callback notifications from the live transport.
enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { clean: bool, reason: Option<String> },
}

/// Why a send attempt did not complete.
#[derive(Debug, thiserror::Error)]
enum SendFailure {
    #[error(transparent)]
    Encode(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no live transport")]
    NoTransport,
}

/// The single owner of all mutable shell state.
struct ShellState {
    config: ShellConfig,
    status: ConnectionStatus,
    last_error: Option<String>,
    reconnect_attempts: u32,
    wants_connection: bool,
    transcript: Vec<TranscriptEntry>,
    queue: VecDeque<OutboundPayload>,
    transport: Option<Box<dyn Transport>>,
    /// Bumped whenever the live transport or timers are invalidated; events
    /// tagged with an older generation are dropped.
    generation: u64,
    events: mpsc::WeakUnboundedSender<ShellEvent>,
    watch_tx: watch::Sender<ShellSnapshot>,
    reconnect_timer: Option<JoinHandle<()>>,
    heartbeat_timer: Option<JoinHandle<()>>,
}

async fn run(mut state: ShellState, mut events: mpsc::UnboundedReceiver<ShellEvent>) {
    while let Some(event) = events.recv().await {
        let keep_going = state.handle_event(event);
        state.publish();
        if !keep_going {
            break;
        }
    }
    state.teardown();
}

impl ShellState {
    fn handle_event(&mut self, event: ShellEvent) -> bool {
        match event {
            ShellEvent::Command(command) => return self.handle_command(command),
            ShellEvent::Transport { generation, event } => {
                if generation == self.generation {
                    self.handle_transport(event);
                } else {
                    tracing::trace!(generation, "dropping stale transport event");
                }
            }
            ShellEvent::ReconnectElapsed { generation } => {
                if generation == self.generation && self.wants_connection {
                    tracing::debug!(attempt = self.reconnect_attempts, "reconnecting");
                    self.open_transport();
                }
            }
            ShellEvent::HeartbeatTick { generation } => {
                if generation == self.generation && self.status == ConnectionStatus::Open {
                    self.send_heartbeat();
                }
            }
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { reply } => {
                let _ = reply.send(self.cmd_connect());
            }
            Command::Disconnect { reason, reply } => {
                self.cmd_disconnect(reason);
                let _ = reply.send(());
            }
            Command::SendUserMessage { text, reply } => {
                let _ = reply.send(self.cmd_send(&text));
            }
            Command::ClearTranscript { reply } => {
                self.transcript.clear();
                self.queue.clear();
                let _ = reply.send(());
            }
            Command::RemoveEntry { id, reply } => {
                let _ = reply.send(self.cmd_remove(&id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.current_snapshot());
            }
            Command::Shutdown { reply } => {
                self.cmd_disconnect(Some("shutdown".to_string()));
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // Public operations -----------------------------------------------------

    fn cmd_connect(&mut self) -> bool {
        self.wants_connection = true;
        // A manual connect starts a fresh backoff cycle.
        self.reconnect_attempts = 0;
        if matches!(
            self.transport_ready(),
            Some(ReadyState::Connecting | ReadyState::Open)
        ) {
            return true;
        }
        self.open_transport()
    }

    fn cmd_disconnect(&mut self, reason: Option<String>) {
        self.wants_connection = false;
        self.cancel_reconnect();
        self.stop_heartbeat();
        if let Some(mut transport) = self.take_transport() {
            self.status = ConnectionStatus::Closing;
            self.publish();
            transport.close(Some(1000), reason.as_deref().or(Some("client disconnect")));
        }
        tracing::debug!("chat shell disconnected");
        self.status = ConnectionStatus::Closed;
    }

    fn cmd_send(&mut self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        let message = create_user_payload(trimmed, &self.config.now);
        // Optimistic entry: the UI reflects the send before any network
        // activity happens.
        let entry = TranscriptEntry::outgoing(message.id.clone(), trimmed, message.ts.clone());
        self.transcript =
            append_limited(&self.transcript, entry, self.config.transcript_capacity);
        let payload = OutboundPayload::UserMessage(message);

        self.wants_connection = true;
        if !matches!(
            self.transport_ready(),
            Some(ReadyState::Connecting | ReadyState::Open)
        ) {
            self.reconnect_attempts = 0;
            self.open_transport();
        }

        if self.transport_ready() == Some(ReadyState::Open) {
            match self.try_send(&payload) {
                Ok(()) => {
                    if let Some(id) = payload.id() {
                        self.transcript = mark_pending(&self.transcript, id, false);
                    }
                }
                Err(failure) => {
                    self.enqueue(payload);
                    self.fail_and_close(format!("send failed: {failure}"), "send-failed");
                }
            }
        } else {
            self.enqueue(payload);
        }
        true
    }

    fn cmd_remove(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        if !self.transcript.iter().any(|entry| entry.id == id) {
            return false;
        }
        self.transcript.retain(|entry| entry.id != id);
        self.queue.retain(|payload| payload.id() != Some(id));
        true
    }

    // Transport lifecycle ---------------------------------------------------

    /// Start a connection attempt. Returns `false` when the shell is not
    /// configured or the attempt could not be started.
    fn open_transport(&mut self) -> bool {
        let token = self.config.auth_token.as_ref().and_then(|get| get());
        let url =
            assistant_chat_protocol::resolve_socket_url(&self.config.endpoint, token.as_deref());
        if url.is_empty() {
            tracing::debug!("no endpoint configured; chat disabled");
            self.status = ConnectionStatus::Disabled;
            return false;
        }
        self.cancel_reconnect();
        if let Some(mut stale) = self.take_transport() {
            stale.close(None, Some("superseded"));
        }
        self.status = ConnectionStatus::Connecting;
        match self.config.factory.connect(&url) {
            Ok(mut transport) => {
                self.install_callbacks(transport.as_mut());
                self.transport = Some(transport);
                true
            }
            Err(error) => {
                self.fail(format!("connect failed: {error}"));
                false
            }
        }
    }

    /// Detach and return the live transport, invalidating all events and
    /// timers tagged with the old generation.
    fn take_transport(&mut self) -> Option<Box<dyn Transport>> {
        self.generation = self.generation.wrapping_add(1);
        let mut transport = self.transport.take()?;
        transport.set_on_open(None);
        transport.set_on_message(None);
        transport.set_on_error(None);
        transport.set_on_close(None);
        Some(transport)
    }

    fn install_callbacks(&self, transport: &mut dyn Transport) {
        let generation = self.generation;

        let events = self.events.clone();
        transport.set_on_open(Some(Box::new(move || {
            if let Some(events) = events.upgrade() {
                let _ = events.send(ShellEvent::Transport {
                    generation,
                    event: TransportEvent::Opened,
                });
            }
        })));

        let events = self.events.clone();
        transport.set_on_message(Some(Box::new(move |text| {
            if let Some(events) = events.upgrade() {
                let _ = events.send(ShellEvent::Transport {
                    generation,
                    event: TransportEvent::Message(text),
                });
            }
        })));

        let events = self.events.clone();
        transport.set_on_error(Some(Box::new(move |message| {
            if let Some(events) = events.upgrade() {
                let _ = events.send(ShellEvent::Transport {
                    generation,
                    event: TransportEvent::Error(message),
                });
            }
        })));

        let events = self.events.clone();
        transport.set_on_close(Some(Box::new(move |close: CloseEvent| {
            if let Some(events) = events.upgrade() {
                let _ = events.send(ShellEvent::Transport {
                    generation,
                    event: TransportEvent::Closed {
                        clean: close.clean,
                        reason: close.reason,
                    },
                });
            }
        })));
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                tracing::debug!("chat transport open");
                self.status = ConnectionStatus::Open;
                self.last_error = None;
                self.reconnect_attempts = 0;
                self.cancel_reconnect();
                self.start_heartbeat();
                self.flush_queue();
            }
            TransportEvent::Message(text) => self.handle_frame(&text),
            TransportEvent::Error(message) => {
                tracing::warn!(%message, "chat transport error");
                self.last_error = Some(message);
                self.status = ConnectionStatus::Error;
            }
            TransportEvent::Closed { clean, reason } => {
                self.stop_heartbeat();
                drop(self.take_transport());
                if !self.wants_connection {
                    self.status = ConnectionStatus::Closed;
                } else if clean && self.status != ConnectionStatus::Error {
                    tracing::debug!("chat transport closed");
                    self.status = ConnectionStatus::Closed;
                } else {
                    let reason =
                        reason.unwrap_or_else(|| "connection closed unexpectedly".to_string());
                    self.fail(reason);
                }
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let capacity = self.config.transcript_capacity;
        match parse_incoming(text, &self.config.now) {
            IncomingEvent::Message(message) => {
                self.transcript = upsert_incoming_message(&self.transcript, &message, capacity);
            }
            IncomingEvent::History(items) => {
                self.transcript = merge_history(&self.transcript, &items, capacity);
            }
            IncomingEvent::Ack { id } => {
                self.transcript = mark_pending(&self.transcript, &id, false);
            }
            IncomingEvent::StreamChunk { id, text, at } => {
                self.transcript =
                    apply_stream_chunk(&self.transcript, &id, &text, &at, capacity);
            }
            IncomingEvent::StreamEnd { id } => {
                self.transcript = mark_pending(&self.transcript, &id, false);
            }
            IncomingEvent::Ignore => tracing::trace!("ignoring inbound frame"),
        }
    }

    // Outbound path ---------------------------------------------------------

    fn try_send(&mut self, payload: &OutboundPayload) -> Result<(), SendFailure> {
        let wire = payload_to_wire(payload)?;
        let transport = self.transport.as_mut().ok_or(SendFailure::NoTransport)?;
        transport.send(&wire)?;
        Ok(())
    }

    fn enqueue(&mut self, payload: OutboundPayload) {
        self.queue.push_back(payload);
        while self.queue.len() > self.config.transcript_capacity {
            self.queue.pop_front();
        }
    }

    /// Drain the queue in enqueue order. The first failure puts the failed
    /// payload back at the front, keeps the rest untouched behind it, and
    /// tears the connection down, so nothing is lost or reordered.
    fn flush_queue(&mut self) {
        while let Some(payload) = self.queue.pop_front() {
            match self.try_send(&payload) {
                Ok(()) => {
                    if let Some(id) = payload.id() {
                        self.transcript = mark_pending(&self.transcript, id, false);
                    }
                }
                Err(failure) => {
                    self.queue.push_front(payload);
                    self.fail_and_close(format!("queue flush failed: {failure}"), "flush-failed");
                    break;
                }
            }
        }
    }

    fn send_heartbeat(&mut self) {
        let payload = create_heartbeat_payload(&self.config.now);
        if let Err(failure) = self.try_send(&payload) {
            self.fail_and_close(format!("heartbeat failed: {failure}"), "heartbeat-failed");
        }
    }

    // Failure and recovery --------------------------------------------------

    fn fail(&mut self, message: String) {
        tracing::warn!(%message, "chat connection failure");
        self.stop_heartbeat();
        self.last_error = Some(message);
        self.status = ConnectionStatus::Error;
        self.schedule_reconnect();
    }

    fn fail_and_close(&mut self, message: String, close_reason: &str) {
        if let Some(mut transport) = self.take_transport() {
            transport.close(None, Some(close_reason));
        }
        self.fail(message);
    }

    fn schedule_reconnect(&mut self) {
        if !self.wants_connection || !self.config.auto_reconnect {
            return;
        }
        if self.reconnect_attempts >= self.config.reconnect_max_attempts {
            tracing::warn!(
                attempts = self.reconnect_attempts,
                "reconnect limit reached; giving up"
            );
            self.last_error = Some("reconnect limit reached".to_string());
            self.status = ConnectionStatus::Closed;
            return;
        }
        let delay = reconnect_delay(
            self.config.reconnect_base_delay_ms,
            self.config.reconnect_max_delay_ms,
            self.reconnect_attempts,
        );
        self.reconnect_attempts += 1;
        self.cancel_reconnect();
        let generation = self.generation;
        let events = self.events.clone();
        tracing::debug!(
            attempt = self.reconnect_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(ShellEvent::ReconnectElapsed { generation });
            }
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();
        if self.config.heartbeat_interval_ms == 0 {
            return;
        }
        let period = Duration::from_millis(self.config.heartbeat_interval_ms);
        let generation = self.generation;
        let events = self.events.clone();
        self.heartbeat_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of an interval fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(events) = events.upgrade() else { break };
                if events
                    .send(ShellEvent::HeartbeatTick { generation })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(timer) = self.heartbeat_timer.take() {
            timer.abort();
        }
    }

    // Observation -----------------------------------------------------------

    fn transport_ready(&self) -> Option<ReadyState> {
        self.transport.as_ref().map(|t| t.ready_state())
    }

    fn current_snapshot(&self) -> ShellSnapshot {
        ShellSnapshot {
            status: self.status,
            last_error: self.last_error.clone(),
            transcript: self.transcript.clone(),
            pending_count: self.transcript.iter().filter(|e| e.pending).count(),
            queued_count: self.queue.len(),
        }
    }

    fn publish(&self) {
        let next = self.current_snapshot();
        self.watch_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn teardown(&mut self) {
        self.cmd_disconnect(Some("shell dropped".to_string()));
        self.publish();
    }
}
