//! Fair-share bandwidth allocator (§4.5).

use std::time::Instant;

use crate::protocol::constants::{IDLE_CONNECTION_TIMEOUT, MIN_BPM_CHANGE, MIN_BPM_PER_PEER};

/// Global preference accounting shared by the dispatcher across all
/// neighbors (§4.5, P6: "sum of per-neighbor current_preference equals
/// preference_sum").
#[derive(Debug, Default)]
pub struct PreferenceAccount {
    preference_sum: u64,
}

impl PreferenceAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sum(&self) -> u64 {
        self.preference_sum
    }

    /// Add `delta` to `current_preference` and the running sum, halving both
    /// if the sum would overflow (§4.5 "on overflow... halved").
    pub fn accumulate(&mut self, current_preference: &mut u64, delta: u64) {
        match self.preference_sum.checked_add(delta) {
            Some(new_sum) => {
                self.preference_sum = new_sum;
                *current_preference += delta;
            }
            None => {
                self.preference_sum /= 2;
                *current_preference /= 2;
                self.preference_sum += delta / 2;
                *current_preference += delta / 2;
            }
        }
    }

    /// Remove a neighbor's contribution to the running sum (on teardown).
    pub fn remove(&mut self, current_preference: u64) {
        self.preference_sum = self.preference_sum.saturating_sub(current_preference);
    }
}

/// Inputs to one neighbor's quota recompute tick (§4.5 steps 1-4).
pub struct QuotaInputs {
    pub current_preference: u64,
    pub preference_sum: u64,
    pub neighbor_count: usize,
    pub bandwidth_target_out: u64,
    pub last_activity: Instant,
    pub session_established: Option<Instant>,
    pub now: Instant,
}

/// Result of one quota recompute: the new target inbound quota for this
/// neighbor, and whether it changed enough to push to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub q_in: u64,
    pub should_notify_transport: bool,
    pub idle_disconnect: bool,
}

/// Compute one neighbor's new target inbound quota (§4.5 steps 1-4).
pub fn compute_quota(inputs: &QuotaInputs, current_bpm_in: u64) -> QuotaDecision {
    let pref_rel = inputs.current_preference as f64 / (1.0 + inputs.preference_sum as f64);

    let reserved_floor = inputs.neighbor_count as u64 * MIN_BPM_PER_PEER;
    let distributable = inputs.bandwidth_target_out.saturating_sub(reserved_floor);

    let mut q_in = MIN_BPM_PER_PEER + (distributable as f64 * pref_rel) as u64;

    let idle_disconnect = is_idle(inputs);
    if idle_disconnect {
        q_in = 0;
    }

    let delta = q_in.abs_diff(current_bpm_in);
    QuotaDecision {
        q_in,
        should_notify_transport: delta > MIN_BPM_CHANGE,
        idle_disconnect,
    }
}

fn is_idle(inputs: &QuotaInputs) -> bool {
    let activity_idle = inputs.now.saturating_duration_since(inputs.last_activity) > IDLE_CONNECTION_TIMEOUT;
    let session_idle = match inputs.session_established {
        Some(established) => {
            inputs.now.saturating_duration_since(established) > IDLE_CONNECTION_TIMEOUT
        }
        None => false,
    };
    activity_idle && session_idle
}
