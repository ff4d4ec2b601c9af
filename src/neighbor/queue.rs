//! Per-neighbor plaintext and encrypted-datagram queues (§3, §4.3).

use std::collections::VecDeque;
use std::time::Instant;

use crate::protocol::constants::MAX_PEER_QUEUE_SIZE;

/// A message awaiting scheduling, ordered into the queue by deadline.
#[derive(Debug, Clone)]
pub struct PlaintextEntry {
    pub deadline: Instant,
    pub priority: u32,
    pub payload: Vec<u8>,
    /// Scheduler's tentative mark: true means "selected to skip" during the
    /// feasibility loop, or "selected to send" after batch selection,
    /// depending on scheduling phase (§4.3 step 2).
    pub do_transmit: bool,
    /// Set once this entry has been granted slack in a prior round, so it
    /// contributes no further slack (§4.3 step 2, deferral guard).
    pub got_slack: bool,
}

impl PlaintextEntry {
    pub fn new(deadline: Instant, priority: u32, payload: Vec<u8>) -> Self {
        Self {
            deadline,
            priority,
            payload,
            do_transmit: false,
            got_slack: false,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Plaintext queue: sorted by deadline ascending, capped at
/// `MAX_PEER_QUEUE_SIZE` with priority-based eviction (§3, §4.3).
#[derive(Debug, Default)]
pub struct PlaintextQueue {
    entries: Vec<PlaintextEntry>,
}

/// Outcome of a plaintext-queue insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The incoming entry was dropped; an index into the (pre-insertion)
    /// queue identifies the entry that would have been evicted had priority
    /// allowed it.
    RejectedQueueFull,
}

impl PlaintextQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaintextEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlaintextEntry> {
        self.entries.iter_mut()
    }

    /// Insert `entry`, maintaining deadline order. If the queue is at
    /// capacity, the lowest-priority existing entry is evicted in favor of
    /// the new one only if the new one's priority is strictly greater (§4.3).
    pub fn insert(&mut self, entry: PlaintextEntry) -> InsertOutcome {
        if self.entries.len() >= MAX_PEER_QUEUE_SIZE {
            let min_index = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.priority)
                .map(|(i, _)| i)
                .expect("queue at capacity is non-empty");
            if entry.priority <= self.entries[min_index].priority {
                return InsertOutcome::RejectedQueueFull;
            }
            self.entries.remove(min_index);
        }
        let position = self
            .entries
            .partition_point(|e| e.deadline <= entry.deadline);
        self.entries.insert(position, entry);
        InsertOutcome::Inserted
    }

    /// Drop entries whose deadline is more than `tolerance` in the past
    /// (§4.3 step 1).
    pub fn discard_expired(&mut self, now: Instant, tolerance: std::time::Duration) {
        self.entries
            .retain(|e| now.saturating_duration_since(e.deadline) <= tolerance);
    }

    /// Remove and return entries marked `do_transmit`, preserving order.
    pub fn take_selected(&mut self) -> Vec<PlaintextEntry> {
        let (selected, remaining): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.do_transmit);
        self.entries = remaining;
        selected
    }

    /// Remove entries marked for discard (the feasibility loop's rolling
    /// "mark minimum-priority entry as skip" action), returning how many
    /// were removed.
    pub fn remove_discarded(&mut self, discard_indices: &[usize]) {
        let mut sorted = discard_indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        for idx in sorted {
            self.entries.remove(idx);
        }
    }

    pub fn clear_transmit_marks(&mut self) {
        for e in &mut self.entries {
            e.do_transmit = false;
        }
    }
}

/// An already-framed, encrypted datagram awaiting transport (§3).
#[derive(Debug, Clone)]
pub struct EncryptedEntry {
    pub deadline: Instant,
    pub priority: u32,
    pub bytes: Vec<u8>,
}

/// FIFO queue of encrypted datagrams (§3 invariant: "the encrypted queue is FIFO").
#[derive(Debug, Default)]
pub struct EncryptedQueue {
    entries: VecDeque<EncryptedEntry>,
}

impl EncryptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, entry: EncryptedEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<EncryptedEntry> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&EncryptedEntry> {
        self.entries.front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
