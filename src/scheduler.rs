//! Outbound scheduler: EDF-with-slack batch selection and encrypted-datagram
//! assembly (§4.3).

use std::time::{Duration, Instant};

use crate::crypto::cipher::encrypt_body;
use crate::crypto::identity::SessionKey;
use crate::envelope::{BatchBody, EncryptedEnvelope};
use crate::neighbor::queue::{EncryptedEntry, PlaintextEntry, PlaintextQueue};
use crate::protocol::constants::PAST_EXPIRATION_DISCARD_TIME;

/// Scheduling horizon: don't look past this many bytes of queued work.
fn horizon_bytes(target_batch_size: usize) -> usize {
    target_batch_size * 2
}

/// What `select_batch` decided to do this tick.
#[derive(Debug)]
pub enum BatchDecision {
    /// Not enough has accumulated yet; defer and retry in `retry_after`.
    Defer { retry_after: Duration },
    /// These entries (in queue order) should be packed into one datagram.
    Emit(Vec<PlaintextEntry>),
    /// Nothing queued.
    Empty,
}

/// Run the feasibility loop, slack computation, and deferral check over
/// `queue` and return what to do this tick (§4.3 steps 1-3).
///
/// `available_window` is the neighbor's current `available_send_window`
/// (already refreshed by the caller); `quota_bpm` is `current_bpm_out`.
pub fn select_batch(
    queue: &mut PlaintextQueue,
    now: Instant,
    available_window: i64,
    quota_bpm: u64,
    target_batch_size: usize,
) -> BatchDecision {
    queue.discard_expired(now, PAST_EXPIRATION_DISCARD_TIME);
    if queue.is_empty() {
        return BatchDecision::Empty;
    }

    let rate_per_sec = quota_bpm as f64 / 60.0;
    let horizon = horizon_bytes(target_batch_size);

    // Work over a snapshot of (index, entry) pairs; the real queue is only
    // mutated once the final selection is known.
    let entries: Vec<PlaintextEntry> = queue.iter().cloned().collect();
    let mut discarded = vec![false; entries.len()];

    loop {
        let mut cumulative: usize = 0;
        let mut infeasible = None;
        for (i, entry) in entries.iter().enumerate() {
            if discarded[i] {
                continue;
            }
            if cumulative > horizon {
                break;
            }
            cumulative += entry.size();
            let dt = entry
                .deadline
                .saturating_duration_since(now)
                .as_secs_f64();
            let budget = available_window as f64 + dt * rate_per_sec;
            if cumulative as f64 > budget {
                let min_idx = entries
                    .iter()
                    .enumerate()
                    .take(i + 1)
                    .filter(|(j, _)| !discarded[*j])
                    .min_by_key(|(_, e)| e.priority)
                    .map(|(j, _)| j)
                    .expect("at least entry i is a candidate");
                discarded[min_idx] = true;
                infeasible = Some(min_idx);
                break;
            }
        }
        if infeasible.is_none() {
            break;
        }
    }

    // Slack: the smallest margin, across all fitting entries within the
    // horizon, between their deadline-derived budget and what's already
    // claimed, honoring the got-slack guard (§4.3 step 2).
    let mut slack = Duration::MAX;
    let mut cumulative: usize = 0;
    let mut selected_bytes: usize = 0;
    let mut fitting = vec![false; entries.len()];
    for (i, entry) in entries.iter().enumerate() {
        if discarded[i] {
            continue;
        }
        if cumulative > horizon {
            break;
        }
        cumulative += entry.size();
        selected_bytes += entry.size();
        fitting[i] = true;

        let time_to_deadline = entry.deadline.saturating_duration_since(now);
        if entry.got_slack {
            slack = Duration::ZERO;
        } else {
            let dt = time_to_deadline.as_secs_f64();
            let budget = available_window as f64 + dt * rate_per_sec;
            let margin_bytes = (budget - cumulative as f64).max(0.0);
            let margin_secs = if rate_per_sec > 0.0 {
                margin_bytes / rate_per_sec
            } else {
                0.0
            };
            let contribution = Duration::from_secs_f64(margin_secs).min(time_to_deadline);
            slack = slack.min(contribution);
        }
    }

    if fitting.iter().all(|f| !f) {
        return BatchDecision::Empty;
    }

    let fill_ratio = selected_bytes as f64 / target_batch_size as f64;
    if slack > Duration::from_secs(1) && fill_ratio < 0.25 {
        return BatchDecision::Defer {
            retry_after: Duration::from_secs(1),
        };
    }

    // Commit: mark got_slack on entries that received slack this round, pull
    // the fitting entries out of the real queue in order.
    for (i, entry) in queue.iter_mut().enumerate() {
        if i < fitting.len() && fitting[i] && !entry.got_slack {
            entry.got_slack = true;
        }
        if i < fitting.len() && fitting[i] {
            entry.do_transmit = true;
        }
    }
    let selected = queue.take_selected();
    BatchDecision::Emit(selected)
}

/// Pack selected entries into one `ENCRYPTED_MESSAGE` datagram and return the
/// framed bytes plus the encrypted-queue entry to enqueue (§4.3 step 4).
pub fn build_datagram(
    session_key: &SessionKey,
    sequence_number: u32,
    inbound_quota_hint: u32,
    now_secs: u64,
    selected: &[PlaintextEntry],
) -> EncryptedEntry {
    let mut inner_messages = Vec::new();
    for entry in selected {
        inner_messages.extend_from_slice(&entry.payload);
    }
    let body = BatchBody {
        sequence_number,
        quota_hint: inbound_quota_hint,
        timestamp: now_secs,
        inner_messages,
    };
    let encrypted = encrypt_body(&session_key.key, &body.encode());
    let envelope = EncryptedEnvelope { body: encrypted };
    let bytes = envelope.encode();

    let deadline = selected
        .iter()
        .map(|e| e.deadline)
        .min()
        .unwrap_or_else(Instant::now);
    let priority = selected.iter().map(|e| e.priority).sum();

    EncryptedEntry {
        deadline,
        priority,
        bytes,
    }
}
