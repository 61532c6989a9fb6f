//! Error types for the realtime manager.

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("connection manager stopped")]
    ManagerStopped,
}
