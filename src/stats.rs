//! Statistics counters (§11 "Supplemented features").
//!
//! Plain accumulators, returned by [`Stats::snapshot`] -- no export pipeline.
//! Mirrors the shape of the teacher's `SessionStats`/`QueueStats` structs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global, process-wide counters.
#[derive(Default)]
pub struct Stats {
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub handshakes_completed: AtomicU64,
    pub drops_protocol_violation: AtomicU64,
    pub drops_replay: AtomicU64,
    pub drops_queue_full: AtomicU64,
    pub drops_stale: AtomicU64,
    pub idle_disconnects: AtomicU64,
}

/// A point-in-time copy of [`Stats`], cheap to clone and log.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub handshakes_completed: u64,
    pub drops_protocol_violation: u64,
    pub drops_replay: u64,
    pub drops_queue_full: u64,
    pub drops_stale: u64,
    pub idle_disconnects: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_handshake_completed(&self) {
        self.handshakes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop_protocol_violation(&self) {
        self.drops_protocol_violation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop_replay(&self) {
        self.drops_replay.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop_queue_full(&self) {
        self.drops_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop_stale(&self) {
        self.drops_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_disconnect(&self) {
        self.idle_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            handshakes_completed: self.handshakes_completed.load(Ordering::Relaxed),
            drops_protocol_violation: self.drops_protocol_violation.load(Ordering::Relaxed),
            drops_replay: self.drops_replay.load(Ordering::Relaxed),
            drops_queue_full: self.drops_queue_full.load(Ordering::Relaxed),
            drops_stale: self.drops_stale.load(Ordering::Relaxed),
            idle_disconnects: self.idle_disconnects.load(Ordering::Relaxed),
        }
    }
}
