//! Cache layer stand-in for the headless client.

use std::collections::BTreeSet;
use std::sync::Mutex;

use marquee_protocol::CacheRegionTag;
use marquee_realtime::CacheInvalidator;

/// Logs every invalidation batch and counts them.
#[derive(Debug, Default)]
pub struct LoggingCache {
    invalidations: Mutex<u64>,
}

impl LoggingCache {
    pub fn invalidation_count(&self) -> u64 {
        *self.invalidations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheInvalidator for LoggingCache {
    fn invalidate(&self, tags: &BTreeSet<CacheRegionTag>) {
        let regions: Vec<String> = tags.iter().map(ToString::to_string).collect();
        let mut count = self.invalidations.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        tracing::info!(regions = ?regions, total = *count, "cache regions invalidated");
    }
}
