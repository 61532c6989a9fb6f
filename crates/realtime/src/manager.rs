//! Connection manager for the realtime channel.
//!
//! A single task owns the connection state machine, the backoff counter,
//! every timer, and the live transport handle. Commands from
//! [`ConnectionManager`] and transport callbacks are queued to that task and
//! handled one at a time, so no state is ever touched concurrently. Timers
//! are deadlines polled in the same loop; cancelling one means clearing it.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use marquee_protocol::constants::{WS_CLOSE_NORMAL, WS_CLOSE_UNAUTHORIZED};
use marquee_protocol::{CacheRegionTag, EventType, InboundEvent, heartbeat_frame};

use crate::error::RealtimeError;
use crate::history::{EventHistory, HistoryEntry};
use crate::listeners::{ListenerRegistry, Subscription};
use crate::router::{CacheInvalidator, route};
use crate::transport::{OpenRequest, Transport, TransportEvent, TransportHandle, TransportSink};
use crate::types::{ConnectionState, ConnectionStatus, Credential, RealtimeConfig};

/// Close reason sent on an explicit disconnect.
const CLIENT_DISCONNECT: &str = "client disconnect";

enum Command {
    Initialize {
        credential: Credential,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<ConnectionStatus>,
    },
}

/// Handle to a running connection manager.
///
/// Explicitly constructed and owned by the composition root. Dropping it
/// stops the manager task, which closes any open transport.
pub struct ConnectionManager {
    cmd_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    listeners: ListenerRegistry,
    history: Arc<Mutex<EventHistory>>,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    /// Validates `config` and spawns the manager task. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Result<Self, RealtimeError> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let listeners = ListenerRegistry::new();
        let history = Arc::new(Mutex::new(EventHistory::new(config.history_capacity)));

        let driver = Driver {
            config,
            transport,
            cache,
            listeners: listeners.clone(),
            history: history.clone(),
            status_tx,
            events_tx,
            state: ConnectionState::Disconnected,
            attempt: 0,
            next_retry: None,
            dropped_frames: 0,
            credential: None,
            handle: None,
            generation: 0,
            connect_deadline: None,
            heartbeat_at: None,
            retry_at: None,
        };
        let task = tokio::spawn(driver.run(cmd_rx, events_rx));

        Ok(Self {
            cmd_tx,
            status_rx,
            listeners,
            history,
            task,
        })
    }

    /// Starts (or restarts) synchronisation with `credential`.
    ///
    /// Returns once the manager has acted on the request; the connection
    /// itself completes asynchronously.
    pub async fn initialize(&self, credential: impl Into<Credential>) -> Result<(), RealtimeError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Initialize {
            credential: credential.into(),
            done,
        })
        .await?;
        rx.await.map_err(|_| RealtimeError::ManagerStopped)
    }

    /// Stops synchronisation: cancels every timer, closes the transport, and
    /// resets the backoff counter. Safe to call in any state.
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Disconnect { done }).await?;
        rx.await.map_err(|_| RealtimeError::ManagerStopped)
    }

    /// Status after every input queued so far has been handled.
    pub async fn current_status(&self) -> Result<ConnectionStatus, RealtimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| RealtimeError::ManagerStopped)
    }

    /// Last published connection state.
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Last published status.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Registers a listener for `key` (an event type, or `"*"` for all).
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(key, callback)
    }

    /// Copy of the retained event history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        lock_history(&self.history).snapshot()
    }

    /// Retained events recorded after sequence number `seq`.
    pub fn history_since(&self, seq: u64) -> Vec<HistoryEntry> {
        lock_history(&self.history).since(seq)
    }

    /// Disconnects and waits for the manager task to exit.
    pub async fn shutdown(self) {
        let _ = self.disconnect().await;
        drop(self.cmd_tx);
        let _ = self.task.await;
        info!("connection manager shut down");
    }

    async fn send(&self, cmd: Command) -> Result<(), RealtimeError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RealtimeError::ManagerStopped)
    }
}

fn lock_history(history: &Mutex<EventHistory>) -> MutexGuard<'_, EventHistory> {
    history.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolves at `at`, or never when no deadline is armed.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// The manager task: sole owner of connection state.
struct Driver {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheInvalidator>,
    listeners: ListenerRegistry,
    history: Arc<Mutex<EventHistory>>,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: mpsc::Sender<(u64, TransportEvent)>,

    state: ConnectionState,
    attempt: u32,
    next_retry: Option<Duration>,
    dropped_frames: u64,
    credential: Option<Credential>,

    handle: Option<Box<dyn TransportHandle>>,
    /// Generation of the current transport attempt.
    generation: u64,

    connect_deadline: Option<Instant>,
    heartbeat_at: Option<Instant>,
    retry_at: Option<Instant>,
}

impl Driver {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut events_rx: mpsc::Receiver<(u64, TransportEvent)>,
    ) {
        loop {
            // Transport input first, then due timers, then commands.
            tokio::select! {
                biased;
                Some((generation, event)) = events_rx.recv() => {
                    self.handle_transport_event(generation, event);
                }
                () = deadline(self.connect_deadline) => self.on_connect_timeout(),
                () = deadline(self.retry_at) => self.on_retry_due(),
                () = deadline(self.heartbeat_at) => self.on_heartbeat(),
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        // A deadline that passed while parked may not have
                        // been woken yet; the command must observe it.
                        self.fire_due_deadlines();
                        self.handle_command(cmd);
                    }
                    None => break,
                },
            }
        }

        debug!("manager handle dropped, stopping");
        self.disconnect();
    }

    fn fire_due_deadlines(&mut self) {
        let now = Instant::now();
        let due = |at: Option<Instant>| at.is_some_and(|at| at <= now);
        if due(self.connect_deadline) {
            self.on_connect_timeout();
        }
        if due(self.retry_at) {
            self.on_retry_due();
        }
        if due(self.heartbeat_at) {
            self.on_heartbeat();
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Initialize { credential, done } => {
                self.initialize(credential);
                let _ = done.send(());
            }
            Command::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn initialize(&mut self, credential: Credential) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.credential = Some(credential);
                self.attempt = 0;
                self.open_transport();
            }
            ConnectionState::Reconnecting => {
                debug!(attempt = self.attempt, "initialize while reconnecting, retrying now");
                self.credential = Some(credential);
                self.cancel_retry();
                self.open_transport();
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                if self.credential.as_ref() == Some(&credential) {
                    debug!(state = %self.state, "already initialized");
                    return;
                }
                info!("credential changed, reconnecting");
                self.teardown_transport();
                self.credential = Some(credential);
                self.attempt = 0;
                self.open_transport();
            }
        }
    }

    /// Explicit cancellation entry point. Idempotent.
    fn disconnect(&mut self) {
        self.cancel_retry();
        self.teardown_transport();
        self.credential = None;
        self.attempt = 0;
        self.transition(ConnectionState::Disconnected);
    }

    /// Single entry point for every transport callback.
    fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.handle.is_none() {
            trace!(
                generation,
                current = self.generation,
                "ignoring event from superseded transport"
            );
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed { code, reason } => self.on_closed(code, &reason),
            TransportEvent::Error(message) => {
                warn!(state = %self.state, error = %message, "transport error");
                self.teardown_transport();
                self.schedule_retry();
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            trace!(state = %self.state, "duplicate open ignored");
            return;
        }
        self.connect_deadline = None;
        self.attempt = 0;
        self.next_retry = None;
        if !self.config.heartbeat_interval.is_zero() {
            self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
        }
        info!(generation = self.generation, "connected");
        self.transition(ConnectionState::Connected);

        // Traffic during the gap is unknown; everything may be stale.
        let event = InboundEvent::synthetic(
            EventType::CacheInvalidateAll,
            serde_json::json!({}),
            Utc::now(),
        );
        self.dispatch(event);
    }

    fn on_message(&mut self, text: &str) {
        if self.state != ConnectionState::Connected {
            trace!(state = %self.state, "frame before open dropped");
            return;
        }
        let event = match InboundEvent::parse(text, Utc::now()) {
            Ok(event) => event,
            Err(e) => {
                self.dropped_frames += 1;
                warn!(
                    error = %e,
                    dropped = self.dropped_frames,
                    "malformed frame dropped"
                );
                self.publish_status();
                return;
            }
        };
        let kind = event.kind();
        if kind.is_heartbeat() {
            trace!(event_type = %event.event_type, "heartbeat frame");
            return;
        }
        if kind.is_local() {
            self.dropped_frames += 1;
            warn!(
                event_type = %event.event_type,
                dropped = self.dropped_frames,
                "server frame uses a locally generated event type, dropped"
            );
            self.publish_status();
            return;
        }
        self.dispatch(event);
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        info!(state = %self.state, code, reason, "transport closed");
        self.teardown_transport();

        if code == WS_CLOSE_UNAUTHORIZED {
            warn!("credential rejected by server, not reconnecting");
            self.cancel_retry();
            self.transition(ConnectionState::Error);
        } else if code == WS_CLOSE_NORMAL && self.state == ConnectionState::Connected {
            self.attempt = 0;
            self.transition(ConnectionState::Disconnected);
        } else {
            self.schedule_retry();
        }
    }

    fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        warn!(
            timeout_ms = self.config.connect_timeout.as_millis() as u64,
            "connect timed out"
        );
        self.teardown_transport();
        self.schedule_retry();
    }

    fn on_retry_due(&mut self) {
        self.retry_at = None;
        self.next_retry = None;
        self.open_transport();
    }

    fn on_heartbeat(&mut self) {
        if self.state != ConnectionState::Connected {
            self.heartbeat_at = None;
            return;
        }
        self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
        if let Some(handle) = &self.handle {
            match handle.send(heartbeat_frame(Utc::now())) {
                Ok(()) => trace!("heartbeat sent"),
                Err(e) => debug!(error = %e, "heartbeat skipped"),
            }
        }
    }

    /// Starts a new transport attempt. The previous handle must already be
    /// gone.
    fn open_transport(&mut self) {
        let Some(credential) = self.credential.clone() else {
            warn!("no credential, cannot connect");
            self.transition(ConnectionState::Disconnected);
            return;
        };
        debug_assert!(self.handle.is_none(), "previous transport still alive");

        self.generation += 1;
        let sink = TransportSink::new(self.generation, self.events_tx.clone());
        let request = OpenRequest {
            url: self.config.url.clone(),
            credential,
        };

        info!(
            url = %self.config.url,
            generation = self.generation,
            attempt = self.attempt,
            "connecting"
        );
        self.transition(ConnectionState::Connecting);

        match self.transport.open(request, sink) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.connect_deadline = Some(Instant::now() + self.config.connect_timeout);
            }
            Err(e) => {
                warn!(error = %e, "transport open failed");
                self.schedule_retry();
            }
        }
    }

    /// Closes and drops the current transport, stopping its timers.
    fn teardown_transport(&mut self) {
        self.connect_deadline = None;
        self.heartbeat_at = None;
        if let Some(handle) = self.handle.take() {
            handle.close(WS_CLOSE_NORMAL, CLIENT_DISCONNECT);
        }
    }

    fn cancel_retry(&mut self) {
        self.retry_at = None;
        self.next_retry = None;
    }

    /// Arms the next retry, or settles in `Error` once the budget is spent.
    fn schedule_retry(&mut self) {
        if self.attempt >= self.config.max_attempts {
            warn!(
                attempts = self.attempt,
                "reconnect attempts exhausted, manual initialize required"
            );
            self.cancel_retry();
            self.transition(ConnectionState::Error);
            return;
        }

        self.attempt += 1;
        let delay = self.config.delay_for_attempt(self.attempt);
        self.retry_at = Some(Instant::now() + delay);
        self.next_retry = Some(delay);

        info!(
            attempt = self.attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );
        self.transition(ConnectionState::Reconnecting);
        self.emit_synthetic(
            EventType::ReconnectScheduled,
            serde_json::json!({
                "attempt": self.attempt,
                "delayMs": delay.as_millis() as u64,
            }),
        );
    }

    /// The only path that changes `state`.
    fn transition(&mut self, new: ConnectionState) {
        let old = self.state;
        self.state = new;
        self.publish_status();
        if old == new {
            return;
        }
        debug!(from = %old, to = %new, "state transition");
        self.emit_synthetic(
            EventType::ConnectionStateChange,
            serde_json::json!({ "old": old, "new": new }),
        );
    }

    /// History, then cache invalidation, then listeners.
    fn dispatch(&mut self, event: InboundEvent) {
        lock_history(&self.history).record(event.clone());

        let tags = route(&event);
        if !tags.is_empty() {
            self.invalidate(&event, &tags);
        }

        let delivered = self.listeners.publish(&event);
        trace!(event_type = %event.event_type, delivered, "event dispatched");
    }

    fn invalidate(&self, event: &InboundEvent, tags: &BTreeSet<CacheRegionTag>) {
        debug!(
            event_type = %event.event_type,
            regions = tags.len(),
            "invalidating cache regions"
        );
        let cache = &self.cache;
        if catch_unwind(AssertUnwindSafe(|| cache.invalidate(tags))).is_err() {
            error!(event_type = %event.event_type, "cache invalidation panicked");
        }
    }

    /// Locally generated events go to listeners only.
    fn emit_synthetic(&self, kind: EventType, data: serde_json::Value) {
        let event = InboundEvent::synthetic(kind, data, Utc::now());
        self.listeners.publish(&event);
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempt: self.attempt,
            next_retry: self.next_retry,
            dropped_frames: self.dropped_frames,
        }
    }

    fn publish_status(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
