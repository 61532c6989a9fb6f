//! WebSocket transport over tokio-tungstenite.
//!
//! Each `open` spawns one connection task that performs the handshake,
//! then runs a write pump and a read pump until either side ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use marquee_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::pumps::read::{ReadOutcome, read_pump};
use crate::pumps::write::write_pump;
use crate::transport::{OpenRequest, Transport, TransportError, TransportHandle, TransportSink};

/// Outbound queue depth per connection.
const WRITE_QUEUE: usize = 256;

/// How long a cancelled connection may spend flushing its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Opens WebSocket connections. The credential travels as the
/// `Sec-WebSocket-Protocol` header.
#[derive(Debug, Clone)]
pub struct WsTransport {
    max_message_size: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the inbound message size limit.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }
}

impl Transport for WsTransport {
    fn open(
        &self,
        request: OpenRequest,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let ws_request = build_request(&request)?;

        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(run_connection(
            ws_request,
            self.max_message_size,
            sink,
            write_tx.clone(),
            write_rx,
            open.clone(),
            cancel.clone(),
        ));

        Ok(Box::new(WsHandle {
            write_tx,
            open,
            cancel,
        }))
    }
}

fn build_request(request: &OpenRequest) -> Result<Request, TransportError> {
    let mut ws_request = request.url.as_str().into_client_request()?;
    let token = request.credential.expose();
    if !token.is_empty() {
        let value = HeaderValue::from_str(token).map_err(|_| {
            TransportError::InvalidRequest("credential is not a valid header value".into())
        })?;
        ws_request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(ws_request)
}

async fn run_connection(
    request: Request,
    max_message_size: usize,
    sink: TransportSink,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(max_message_size);
    ws_config.max_frame_size = Some(max_message_size);

    let connect = tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false);
    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(generation = sink.generation(), error = %e, "WebSocket connect failed");
                sink.error(e.to_string()).await;
                return;
            }
        },
    };

    let (write, read) = ws_stream.split();
    open.store(true, Ordering::Release);
    debug!(generation = sink.generation(), "WebSocket open");
    sink.opened().await;

    let writer = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
    let abort_writer = writer.abort_handle();
    let outcome = read_pump(read, &sink, write_tx, max_message_size, cancel.clone()).await;

    open.store(false, Ordering::Release);
    cancel.cancel();
    if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
        debug!(generation = sink.generation(), "close frame not flushed in time");
        abort_writer.abort();
    }

    match outcome {
        ReadOutcome::Cancelled => {}
        ReadOutcome::Closed { code, reason } => sink.closed(code, reason).await,
        ReadOutcome::Failed(message) => sink.error(message).await,
    }
}

/// Handle to one WebSocket connection task.
///
/// Dropping it cancels the connection. The task still flushes a queued close
/// frame, bounded by [`CLOSE_GRACE`].
struct WsHandle {
    write_tx: mpsc::Sender<tungstenite::Message>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl TransportHandle for WsHandle {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.write_tx
            .try_send(tungstenite::Message::Text(frame.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn close(&self, code: u16, reason: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.open.store(false, Ordering::Release);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self
            .write_tx
            .try_send(tungstenite::Message::Close(Some(frame)));
        self.cancel.cancel();
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
