//! WebSocket read pump: forwards incoming frames to the manager.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use marquee_protocol::constants::{WS_CLOSE_ABNORMAL, WS_CLOSE_NO_STATUS};

use crate::transport::TransportSink;

/// How the read side of a connection ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The local side cancelled; nothing to report.
    Cancelled,
    /// The peer closed, or the stream ended.
    Closed { code: u16, reason: String },
    /// The stream failed.
    Failed(String),
}

/// Reads frames from the WebSocket and forwards text payloads to `sink`.
///
/// Frames are forwarded in arrival order; the next frame is not read until
/// the previous one was handed over.
pub(crate) async fn read_pump<S>(
    mut read: S,
    sink: &TransportSink,
    write_tx: mpsc::Sender<tungstenite::Message>,
    max_message_size: usize,
    cancel: CancellationToken,
) -> ReadOutcome
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                forward_text(text.as_str(), sink, max_message_size).await;
            }
            Some(Ok(tungstenite::Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => forward_text(text, sink, max_message_size).await,
                Err(_) => warn!(len = data.len(), "non-UTF-8 binary frame, dropping"),
            },
            Some(Ok(tungstenite::Message::Ping(data))) => {
                trace!("received ping, sending pong");
                let _ = write_tx.try_send(tungstenite::Message::Pong(data));
            }
            Some(Ok(tungstenite::Message::Pong(_))) => {
                trace!("received pong");
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(f) => (u16::from(f.code), f.reason.as_str().to_string()),
                    None => (WS_CLOSE_NO_STATUS, String::new()),
                };
                debug!(code, reason = %reason, "received close frame");
                return ReadOutcome::Closed { code, reason };
            }
            Some(Ok(tungstenite::Message::Frame(_))) => {}
            Some(Err(e)) => {
                warn!("WebSocket read error: {e}");
                return ReadOutcome::Failed(e.to_string());
            }
            None => {
                debug!("WebSocket stream ended");
                return ReadOutcome::Closed {
                    code: WS_CLOSE_ABNORMAL,
                    reason: "stream ended".into(),
                };
            }
        }
    }
}

async fn forward_text(text: &str, sink: &TransportSink, max_message_size: usize) {
    if text.len() > max_message_size {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }
    sink.message(text).await;
}
