//! Cache invalidation routing.
//!
//! Maps an inbound event to the cache regions it makes stale. The mapping is
//! a static table; unrecognised events invalidate nothing.

use std::collections::BTreeSet;

use marquee_protocol::{CacheRegionTag, EventType, InboundEvent, RegionKind};

/// The external cache layer. Marks regions stale so the next read refetches.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, tags: &BTreeSet<CacheRegionTag>);
}

/// Regions made stale by `event`.
pub fn route(event: &InboundEvent) -> BTreeSet<CacheRegionTag> {
    use RegionKind::*;

    match event.kind() {
        EventType::QueueUpdate => kinds(&[Queue]),
        EventType::ActivityUpdate => kinds(&[Activity]),
        EventType::HealthUpdate => kinds(&[Health]),
        EventType::MovieUpdate => match entity_id(&event.data) {
            Some(id) => BTreeSet::from([
                CacheRegionTag::entity(Movie, id),
                CacheRegionTag::list(Movie),
            ]),
            None => kinds(&[Movie]),
        },
        EventType::DownloadComplete => kinds(&[Queue, Movie, Activity, History, WantedMovie]),
        EventType::ImportComplete => kinds(&[Movie, Activity, History]),
        EventType::CacheInvalidateAll => all_regions(),
        EventType::Ping
        | EventType::Pong
        | EventType::ConnectionStateChange
        | EventType::ReconnectScheduled
        | EventType::Unknown => BTreeSet::new(),
    }
}

/// Every known region, used after a gap of unknown length.
pub fn all_regions() -> BTreeSet<CacheRegionTag> {
    kinds(&RegionKind::ALL)
}

fn kinds(kinds: &[RegionKind]) -> BTreeSet<CacheRegionTag> {
    kinds.iter().copied().map(CacheRegionTag::kind).collect()
}

/// Entity id from `data.id`, falling back to `data.movieId`.
fn entity_id(data: &serde_json::Value) -> Option<String> {
    ["id", "movieId"]
        .iter()
        .filter_map(|key| data.get(key))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(number_id(n)),
            _ => None,
        })
}

/// Integral numbers render without a fraction, so `42.0` and `42` name the
/// same entity.
fn number_id(n: &serde_json::Number) -> String {
    if let Some(v) = n.as_u64() {
        return v.to_string();
    }
    if let Some(v) = n.as_i64() {
        return v.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}
