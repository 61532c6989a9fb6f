//! Realtime synchronisation channel for the movie library client.
//!
//! Keeps a single push channel to the server alive, fans inbound events out
//! to listeners, records them in a bounded history, and invalidates the
//! cache regions each event makes stale.

pub mod backoff;
pub mod error;
pub mod history;
pub mod listeners;
pub mod manager;
mod pumps;
pub mod router;
pub mod transport;
pub mod types;
pub mod ws_transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::RealtimeError;
pub use history::{EventHistory, HistoryEntry};
pub use listeners::{Listener, ListenerRegistry, Subscription};
pub use manager::ConnectionManager;
pub use router::{CacheInvalidator, all_regions, route};
pub use transport::{
    OpenRequest, Transport, TransportError, TransportEvent, TransportHandle, TransportSink,
};
pub use types::{ConnectionState, ConnectionStatus, Credential, RealtimeConfig};
pub use ws_transport::WsTransport;
