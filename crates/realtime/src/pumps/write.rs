//! WebSocket write pump: serialises outbound frames.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Writes queued frames to the WebSocket.
///
/// Queued frames win over cancellation, so a close frame queued right before
/// cancelling still goes out. Stops after sending a close frame; sends a bare
/// one on the way out if none was queued.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        let is_close = matches!(m, tungstenite::Message::Close(_));
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                        if is_close {
                            return;
                        }
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
