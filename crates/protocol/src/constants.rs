use serde::{Deserialize, Serialize};

/// Close code for an intentional, orderly shutdown.
pub const WS_CLOSE_NORMAL: u16 = 1000;

/// Close code reported for a close frame that carried no status.
pub const WS_CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ends without a close frame.
pub const WS_CLOSE_ABNORMAL: u16 = 1006;

/// Close code the server uses to reject the credential after the socket
/// opened. Reconnecting with the same credential is pointless.
pub const WS_CLOSE_UNAUTHORIZED: u16 = 4001;

/// Maximum inbound message size in bytes (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Listener key that matches every event type.
pub const WILDCARD_KEY: &str = "*";

/// Identifier used for the collection-level region of an entity kind.
pub const LIST_ID: &str = "LIST";

/// Known event types on the realtime channel.
///
/// Server-pushed types come first, then the client heartbeat, then the
/// synthetic types the connection manager generates locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    QueueUpdate,
    ActivityUpdate,
    HealthUpdate,
    MovieUpdate,
    DownloadComplete,
    ImportComplete,

    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    ConnectionStateChange,
    ReconnectScheduled,
    CacheInvalidateAll,

    /// Forward compatibility: unknown event types deserialize here.
    #[serde(other)]
    Unknown,
}

impl EventType {
    /// Parses a wire tag. Never fails; unrecognised tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "QueueUpdate" => Self::QueueUpdate,
            "ActivityUpdate" => Self::ActivityUpdate,
            "HealthUpdate" => Self::HealthUpdate,
            "MovieUpdate" => Self::MovieUpdate,
            "DownloadComplete" => Self::DownloadComplete,
            "ImportComplete" => Self::ImportComplete,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "ConnectionStateChange" => Self::ConnectionStateChange,
            "ReconnectScheduled" => Self::ReconnectScheduled,
            "CacheInvalidateAll" => Self::CacheInvalidateAll,
            _ => Self::Unknown,
        }
    }

    /// The wire tag for this type. `Unknown` has no tag of its own.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueUpdate => "QueueUpdate",
            Self::ActivityUpdate => "ActivityUpdate",
            Self::HealthUpdate => "HealthUpdate",
            Self::MovieUpdate => "MovieUpdate",
            Self::DownloadComplete => "DownloadComplete",
            Self::ImportComplete => "ImportComplete",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::ConnectionStateChange => "ConnectionStateChange",
            Self::ReconnectScheduled => "ReconnectScheduled",
            Self::CacheInvalidateAll => "CacheInvalidateAll",
            Self::Unknown => "Unknown",
        }
    }

    /// Heartbeat frames carry no application data.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }

    /// Types the connection manager generates itself. Never valid on the wire.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Self::ConnectionStateChange | Self::ReconnectScheduled | Self::CacheInvalidateAll
        )
    }
}
