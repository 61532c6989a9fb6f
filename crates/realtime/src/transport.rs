//! Transport abstraction.
//!
//! A transport opens one duplex, message-oriented connection per call and
//! reports its lifecycle through a [`TransportSink`]. The connection manager
//! owns the returned handle exclusively for the duration of the attempt.

use tokio::sync::mpsc;

use crate::types::Credential;

/// Errors from a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport not open")]
    NotOpen,

    #[error("send queue full")]
    QueueFull,

    #[error("connection closed")]
    Closed,
}

/// Parameters of one connection attempt.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub url: String,
    pub credential: Credential,
}

/// Lifecycle callbacks of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Delivers [`TransportEvent`]s for one attempt, tagged with its generation.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::Sender<(u64, TransportEvent)>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, tx: mpsc::Sender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the attempt this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn opened(&self) {
        self.emit(TransportEvent::Opened).await;
    }

    pub async fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into())).await;
    }

    pub async fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
        .await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into())).await;
    }

    async fn emit(&self, event: TransportEvent) {
        // The manager is gone; nobody is listening.
        let _ = self.tx.send((self.generation, event)).await;
    }
}

/// A live connection attempt.
pub trait TransportHandle: Send {
    /// Queues a text frame. Fails when the connection is not open.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Closes the connection with the given code. Idempotent.
    fn close(&self, code: u16, reason: &str);
}

/// Opens connections.
pub trait Transport: Send + Sync {
    /// Starts a connection attempt. Returning `Err` is equivalent to an
    /// immediate error callback.
    fn open(
        &self,
        request: OpenRequest,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}
