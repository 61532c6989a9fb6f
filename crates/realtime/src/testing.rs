//! In-memory transport and cache doubles for manager tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use marquee_protocol::CacheRegionTag;

use crate::router::CacheInvalidator;
use crate::transport::{OpenRequest, Transport, TransportError, TransportHandle, TransportSink};

/// Connection side of one fake attempt.
#[derive(Debug, Default)]
pub(crate) struct FakeConn {
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
    closed: Mutex<Option<(u16, String)>>,
}

impl FakeConn {
    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn close_code(&self) -> Option<u16> {
        self.closed.lock().unwrap().as_ref().map(|(code, _)| *code)
    }
}

struct FakeHandle(Arc<FakeConn>);

impl TransportHandle for FakeHandle {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.0.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        self.0.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let mut closed = self.0.closed.lock().unwrap();
        if closed.is_none() {
            *closed = Some((code, reason.to_string()));
        }
        self.0.open.store(false, Ordering::SeqCst);
    }
}

struct FakeOpen {
    request: OpenRequest,
    sink: TransportSink,
    conn: Arc<FakeConn>,
}

#[derive(Default)]
struct FakeState {
    attempts: usize,
    fail_opens: bool,
    opens: Vec<FakeOpen>,
}

/// Records every open attempt; the test drives the lifecycle through the
/// captured sinks.
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `open` calls fail synchronously.
    pub(crate) fn fail_opens(&self, fail: bool) {
        self.state.lock().unwrap().fail_opens = fail;
    }

    /// Every `open` call, including failed ones.
    pub(crate) fn open_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub(crate) fn last_request(&self) -> OpenRequest {
        self.with_last(|open| open.request.clone())
    }

    pub(crate) fn last_sink(&self) -> TransportSink {
        self.with_last(|open| open.sink.clone())
    }

    pub(crate) fn last_conn(&self) -> Arc<FakeConn> {
        self.with_last(|open| open.conn.clone())
    }

    /// Completes the handshake of the latest successful attempt.
    pub(crate) async fn accept_last(&self) {
        self.last_conn().set_open(true);
        self.last_sink().opened().await;
    }

    fn with_last<T>(&self, f: impl FnOnce(&FakeOpen) -> T) -> T {
        let state = self.state.lock().unwrap();
        f(state.opens.last().expect("no successful open yet"))
    }
}

impl Transport for FakeTransport {
    fn open(
        &self,
        request: OpenRequest,
        sink: TransportSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.fail_opens {
            return Err(TransportError::InvalidRequest("refused by test".into()));
        }
        let conn = Arc::new(FakeConn::default());
        state.opens.push(FakeOpen {
            request,
            sink,
            conn: conn.clone(),
        });
        Ok(Box::new(FakeHandle(conn)))
    }
}

/// Cache double that records each invalidation batch.
#[derive(Default)]
pub(crate) struct RecordingCache {
    calls: Mutex<Vec<BTreeSet<CacheRegionTag>>>,
}

impl RecordingCache {
    pub(crate) fn calls(&self) -> Vec<BTreeSet<CacheRegionTag>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, tags: &BTreeSet<CacheRegionTag>) {
        self.calls.lock().unwrap().push(tags.clone());
    }
}
