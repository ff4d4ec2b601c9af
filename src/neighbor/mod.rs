//! The per-peer neighbor record (§3) and its key-exchange state machine (§4.2).

pub mod queue;
pub mod replay;
pub mod state;
pub mod window;

use std::time::Instant;

use rand::RngCore;
use tokio::task::JoinHandle;

use crate::crypto::identity::{Identity, SessionKey};
use crate::envelope::PingPongBody;
use crate::protocol::constants::{CLIENT_BACKREF_SLOTS, INITIAL_SET_KEY_RETRY};
use crate::protocol::{DeliveryMode, PeerId};

use queue::{EncryptedQueue, PlaintextQueue};
use replay::ReplayWindow;
use state::KxState;
use window::Window;

/// Client-table index, opaque to the neighbor (§9 "use opaque identifiers
/// in cross-references").
pub type ClientIndex = usize;

/// One per currently-connected peer (§3).
pub struct Neighbor {
    pub peer_id: PeerId,
    pub peer_public_key: Option<Identity>,
    pub kx_state: KxState,

    pub own_session_key: Option<SessionKey>,
    pub peer_session_key: Option<SessionKey>,

    pub next_outbound_sequence: u32,
    pub replay_window: ReplayWindow,

    pub plaintext_queue: PlaintextQueue,
    pub encrypted_queue: EncryptedQueue,

    /// At most one PING buffered while we lack the peer's public key (§4.2).
    pub pending_ping: Option<PingPongBody>,
    /// Our outstanding PING challenge to this peer, awaiting PONG.
    pub outstanding_challenge: Option<u32>,

    pub last_activity: Instant,
    pub session_established: Option<Instant>,

    pub current_bpm_in: u64,
    pub current_bpm_out: u64,
    pub bpm_out_internal_limit: u64,
    pub bpm_out_external_limit: u64,

    pub send_window: Window,
    pub recv_window: Window,

    pub current_preference: u64,

    pub set_key_retry_frequency: std::time::Duration,

    /// Cancellation handles for this neighbor's background tasks (§9).
    pub key_retry_task: Option<JoinHandle<()>>,
    pub plaintext_retry_task: Option<JoinHandle<()>>,
    pub quota_update_task: Option<JoinHandle<()>>,

    /// Peer-info lookup currently outstanding, if any (P8).
    pub peer_info_lookup: Option<JoinHandle<()>>,

    /// Weak back-references to clients that most recently forwarded this
    /// neighbor's replies (§5 "Back-references"), bounded at 8 slots.
    pub client_backrefs: [Option<ClientIndex>; CLIENT_BACKREF_SLOTS],

    /// Per-client subscription options this neighbor's traffic should fan
    /// out under, cached for fast notification routing (§4.6).
    pub outbound_notify_mode: Option<DeliveryMode>,
}

impl Neighbor {
    pub fn new(peer_id: PeerId, peer_public_key: Option<Identity>, now: Instant) -> Self {
        Self {
            peer_id,
            peer_public_key,
            kx_state: KxState::Down,
            own_session_key: None,
            peer_session_key: None,
            next_outbound_sequence: 0,
            replay_window: ReplayWindow::new(),
            plaintext_queue: PlaintextQueue::new(),
            encrypted_queue: EncryptedQueue::new(),
            pending_ping: None,
            outstanding_challenge: None,
            last_activity: now,
            session_established: None,
            current_bpm_in: crate::protocol::constants::DEFAULT_BPM_IN_OUT,
            current_bpm_out: crate::protocol::constants::DEFAULT_BPM_IN_OUT,
            bpm_out_internal_limit: crate::protocol::constants::DEFAULT_BPM_IN_OUT,
            bpm_out_external_limit: crate::protocol::constants::DEFAULT_BPM_IN_OUT,
            send_window: Window::new(now),
            recv_window: Window::new(now),
            current_preference: 0,
            set_key_retry_frequency: INITIAL_SET_KEY_RETRY,
            key_retry_task: None,
            plaintext_retry_task: None,
            quota_update_task: None,
            peer_info_lookup: None,
            client_backrefs: [None; CLIENT_BACKREF_SLOTS],
            outbound_notify_mode: None,
        }
    }

    /// Ensure we have our own session key, generating one if this is the
    /// first time we need it (§3 "generated at neighbor creation").
    pub fn ensure_own_session_key(&mut self) -> SessionKey {
        *self.own_session_key.get_or_insert_with(SessionKey::generate)
    }

    /// Effective outbound rate is the max of the internal policy limit and
    /// the peer's externally advertised inbound limit (§4.4).
    pub fn recompute_bpm_out(&mut self) {
        self.current_bpm_out = self.bpm_out_internal_limit.max(self.bpm_out_external_limit);
    }

    /// Accept a new peer session key if its creation time is strictly newer
    /// than any currently cached (§3 "Lifecycle", §4.1 replay guard item 4).
    pub fn accept_peer_session_key(&mut self, candidate: SessionKey) -> bool {
        match &self.peer_session_key {
            Some(current) if candidate.created_at <= current.created_at => false,
            _ => {
                self.peer_session_key = Some(candidate);
                true
            }
        }
    }

    /// Generate a fresh 32-bit ping challenge and remember it as outstanding.
    pub fn issue_challenge(&mut self) -> u32 {
        let challenge = rand::rngs::OsRng.next_u32();
        self.outstanding_challenge = Some(challenge);
        challenge
    }

    /// Buffer a PING received before we hold the peer's public key. Only one
    /// is kept; a second one arriving is discarded (§4.2 "Deferred PING").
    pub fn buffer_ping(&mut self, ping: PingPongBody) {
        if self.pending_ping.is_none() {
            self.pending_ping = Some(ping);
        }
    }

    pub fn take_buffered_ping(&mut self) -> Option<PingPongBody> {
        self.pending_ping.take()
    }

    /// Cancel every background task owned by this neighbor (§5, §9 "must be
    /// exhaustive").
    pub fn cancel_all_tasks(&mut self) {
        if let Some(handle) = self.key_retry_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.plaintext_retry_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.quota_update_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.peer_info_lookup.take() {
            handle.abort();
        }
    }

    /// Record that `client` most recently forwarded this neighbor's traffic,
    /// evicting the oldest slot if all 8 are occupied (§5).
    pub fn record_backref(&mut self, client: ClientIndex) {
        if self.client_backrefs.iter().any(|c| *c == Some(client)) {
            return;
        }
        if let Some(empty) = self.client_backrefs.iter_mut().find(|c| c.is_none()) {
            *empty = Some(client);
        } else {
            self.client_backrefs.rotate_left(1);
            *self.client_backrefs.last_mut().unwrap() = Some(client);
        }
    }

    /// Scrub every back-reference to `client` (P5, called on client disconnect).
    pub fn scrub_client(&mut self, client: ClientIndex) {
        for slot in &mut self.client_backrefs {
            if *slot == Some(client) {
                *slot = None;
            }
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        self.cancel_all_tasks();
    }
}
