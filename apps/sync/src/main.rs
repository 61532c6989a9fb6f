//! Marquee sync entry point.
//!
//! Connects to the library server's realtime channel and keeps it alive until
//! interrupted, logging event traffic and cache invalidations.

mod cache;
mod config;

use std::sync::Arc;

use marquee_protocol::constants::WILDCARD_KEY;
use marquee_realtime::{ConnectionManager, WsTransport};
use tracing_subscriber::EnvFilter;

use crate::cache::LoggingCache;
use crate::config::SyncConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting Marquee sync");

    let sync_config = match SyncConfig::load() {
        Ok(c) => {
            tracing::info!(server = %c.server_url, "configuration loaded");
            c
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            SyncConfig::default()
        }
    };

    let token = sync_config.effective_token();
    if token.is_empty() {
        anyhow::bail!(
            "no access token: set `token` in the config file or {}",
            config::TOKEN_ENV
        );
    }

    let cache = Arc::new(LoggingCache::default());
    let manager = ConnectionManager::spawn(
        sync_config.realtime_config(),
        Arc::new(WsTransport::new()),
        cache.clone(),
    )?;

    let _events = manager.subscribe(WILDCARD_KEY, |event| {
        tracing::debug!(
            event_type = %event.event_type,
            timestamp = %event.timestamp,
            data = %event.data,
            "event"
        );
    });

    let mut status_rx = manager.watch_status();
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            tracing::info!(
                state = %status.state,
                attempt = status.attempt,
                next_retry_ms = status.next_retry.map(|d| d.as_millis() as u64),
                dropped_frames = status.dropped_frames,
                "status"
            );
        }
    });

    manager.initialize(token).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");

    let history = manager.history();
    manager.shutdown().await;
    status_task.abort();

    tracing::info!(
        events = history.len(),
        last_seq = history.last().map(|e| e.seq),
        invalidations = cache.invalidation_count(),
        "sync stopped"
    );
    Ok(())
}
