//! Public types for the realtime connection manager.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::backoff::backoff_delay;
use crate::error::RealtimeError;

/// Connection state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Idle. Initial state, and the state after an explicit disconnect or a
    /// normal close.
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Open and receiving events.
    Connected,
    /// Connection lost, waiting for the retry timer.
    Reconnecting,
    /// Retry budget exhausted or credential rejected. Needs a manual
    /// `initialize`.
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot of the manager, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt: u32,
    /// Delay of the armed retry timer, if one is pending.
    pub next_retry: Option<Duration>,
    /// Inbound frames dropped because they could not be parsed.
    pub dropped_frames: u64,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            next_retry: None,
            dropped_frames: 0,
        }
    }
}

/// Opaque credential used in the transport handshake.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the transport only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the server.
    pub url: String,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Failed attempts tolerated before settling in `Error`.
    pub max_attempts: u32,
    /// Interval between liveness frames while connected.
    pub heartbeat_interval: Duration,
    /// How long an open may take before it counts as failed.
    pub connect_timeout: Duration,
    /// Entries kept in the event history ring.
    pub history_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7878/ws".into(),
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 10,
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            history_capacity: 1000,
        }
    }
}

impl RealtimeConfig {
    /// Rejects knob combinations the manager cannot run with.
    pub fn validate(&self) -> Result<(), RealtimeError> {
        if self.url.is_empty() {
            return Err(RealtimeError::InvalidConfig("url is empty".into()));
        }
        if self.history_capacity == 0 {
            return Err(RealtimeError::InvalidConfig(
                "history_capacity must be > 0".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(RealtimeError::InvalidConfig(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "connect_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Delay before the given reconnection attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(
            attempt,
            self.initial_delay,
            self.backoff_factor,
            self.max_delay,
        )
    }
}
