//! Send/receive window accrual (§3, §4.1, §4.5, P1).
//!
//! A window is a byte budget that accrues continuously at the neighbor's
//! current quota (bytes/minute) and is spent as traffic flows. It never
//! exceeds `WINDOW_CAP` worth of the current quota.

use std::time::{Duration, Instant};

use crate::protocol::constants::WINDOW_CAP;

#[derive(Debug, Clone, Copy)]
pub struct Window {
    /// May go negative if quota dropped out from under already-granted budget.
    available: i64,
    last_update: Instant,
}

impl Window {
    pub fn new(now: Instant) -> Self {
        Self {
            available: 0,
            last_update: now,
        }
    }

    /// Refresh for elapsed time at `quota_bpm` bytes/minute, capping at
    /// `WINDOW_CAP * quota_bpm` (P1).
    pub fn refresh(&mut self, now: Instant, quota_bpm: u64) {
        let elapsed = now.saturating_duration_since(self.last_update);
        let accrued = accrued_bytes(elapsed, quota_bpm);
        self.available = self.available.saturating_add(accrued as i64);
        let cap = cap_bytes(quota_bpm);
        if self.available > cap {
            self.available = cap;
        }
        self.last_update = now;
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    pub fn spend(&mut self, amount: u64) {
        self.available -= amount as i64;
    }

    /// Reserve (or, if negative, release) `amount` bytes from the window,
    /// clamped to not exceed what's currently available (§4.5 "Inbound
    /// reservation"). Returns the amount actually reserved.
    pub fn reserve_clamped(&mut self, amount: i64) -> i64 {
        let reserved = if amount >= 0 {
            amount.min(self.available.max(0))
        } else {
            amount
        };
        self.available -= reserved;
        reserved
    }
}

fn accrued_bytes(elapsed: Duration, quota_bpm: u64) -> u64 {
    // bytes = quota_bpm * elapsed_seconds / 60, done in a wider type to avoid overflow.
    ((quota_bpm as u128 * elapsed.as_millis()) / (60_000)) as u64
}

fn cap_bytes(quota_bpm: u64) -> i64 {
    let cap_secs = WINDOW_CAP.as_secs();
    ((quota_bpm as u128 * cap_secs as u128) / 60) as i64
}
