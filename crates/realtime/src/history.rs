use std::collections::VecDeque;

use marquee_protocol::InboundEvent;

/// An event together with its arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Arrival sequence number, starting at 1 and never reused.
    pub seq: u64,
    pub event: InboundEvent,
}

/// Fixed-capacity record of received events, for diagnostics and replay.
///
/// Backed by a `VecDeque`. When full, the oldest entry by arrival is evicted
/// on each record. Iteration order is oldest → newest.
#[derive(Debug, Clone)]
pub struct EventHistory {
    buf: VecDeque<HistoryEntry>,
    capacity: usize,
    next_seq: u64,
}

impl EventHistory {
    /// Create an empty history with the given maximum capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "EventHistory capacity must be > 0");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 1,
        }
    }

    /// Append an event, evicting the oldest entry when at capacity.
    /// Returns the sequence number assigned to it.
    pub fn record(&mut self, event: InboundEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(HistoryEntry { seq, event });
        seq
    }

    /// Owned copy of every retained entry, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.buf.iter().cloned().collect()
    }

    /// Retained entries recorded after `seq`.
    pub fn since(&self, seq: u64) -> Vec<HistoryEntry> {
        self.buf.iter().filter(|e| e.seq > seq).cloned().collect()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all entries. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
