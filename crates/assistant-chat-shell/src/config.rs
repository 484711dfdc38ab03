//! Connection shell configuration.

use std::sync::Arc;

use assistant_chat_protocol::{NowFn, system_clock};
use assistant_chat_transcript::DEFAULT_CAPACITY;

use crate::transport::TransportFactory;

/// Supplies the auth token appended to the socket URL. Called once per
/// connection attempt, so rotated tokens are picked up on reconnect.
pub type AuthTokenFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Configuration for [`crate::ChatShell`].
#[derive(Clone)]
pub struct ShellConfig {
    /// Chat endpoint (`http`/`https`/`ws`/`wss`). Empty means the shell is
    /// unconfigured and stays `Disabled`.
    pub endpoint: String,
    /// Optional auth token source.
    pub auth_token: Option<AuthTokenFn>,
    /// Transport factory, the only contact with the network primitive.
    pub factory: Arc<dyn TransportFactory>,
    /// Timestamp source.
    pub now: NowFn,
    /// Schedule reconnects after unexpected drops.
    pub auto_reconnect: bool,
    /// Base backoff delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Heartbeat cadence while open, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Bound on transcript and outbound-queue length.
    pub transcript_capacity: usize,
}

impl ShellConfig {
    /// Config with defaults for everything but the endpoint and factory.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            factory,
            now: system_clock(),
            auto_reconnect: true,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 10_000,
            reconnect_max_attempts: 8,
            heartbeat_interval_ms: 25_000,
            transcript_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Set the auth token source.
    #[must_use]
    pub fn with_auth_token(mut self, auth_token: AuthTokenFn) -> Self {
        self.auth_token = Some(auth_token);
        self
    }

    /// Replace the clock (tests pin timestamps this way).
    #[must_use]
    pub fn with_now(mut self, now: NowFn) -> Self {
        self.now = now;
        self
    }

    /// Enable or disable automatic reconnects.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Set the backoff parameters.
    #[must_use]
    pub const fn with_reconnect_policy(
        mut self,
        base_delay_ms: u64,
        max_delay_ms: u64,
        max_attempts: u32,
    ) -> Self {
        self.reconnect_base_delay_ms = base_delay_ms;
        self.reconnect_max_delay_ms = max_delay_ms;
        self.reconnect_max_attempts = max_attempts;
        self
    }

    /// Set the heartbeat cadence.
    #[must_use]
    pub const fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Set the transcript/queue capacity.
    #[must_use]
    pub const fn with_transcript_capacity(mut self, capacity: usize) -> Self {
        self.transcript_capacity = capacity;
        self
    }
}
