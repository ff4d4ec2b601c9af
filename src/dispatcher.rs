//! Top-level dispatcher: binds transport callbacks and client-request
//! handlers to the other components, and owns the neighbor and client
//! tables (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;

use crate::bandwidth::{compute_quota, PreferenceAccount, QuotaInputs};
use crate::client::{ClientOptions, ClientTable, Notification};
use crate::crypto::cipher::EncryptedBody;
use crate::crypto::identity::{Identity, SessionKey};
use crate::envelope::{PingPongBody, SetKeyEnvelope};
use crate::error::{Error, Result};
use crate::inbound::{process_encrypted_message, RejectReason};
use crate::neighbor::state::{transition, KxEvent, KxState};
use crate::neighbor::{ClientIndex, Neighbor};
use crate::protocol::constants::{
    MAX_ENCRYPTED_MESSAGE_SIZE, NOTIFICATION_HEADER_CAP, PEER_INFO_LOOKUP_TIMEOUT, QUOTA_RECOMPUTE_PERIOD,
};
use crate::protocol::{message_type, MessageHeader, PeerId};
use crate::scheduler::{self, BatchDecision};
use crate::stats::Stats;
use crate::transport::{PeerInfoDirectory, Transport, TransportEvent};

/// Owns every neighbor, the client table, preference accounting, and the
/// handles needed to field transport events and client requests (§4.7, §5).
pub struct Dispatcher {
    identity: Identity,
    neighbors: RwLock<HashMap<PeerId, Arc<Mutex<Neighbor>>>>,
    clients: Mutex<ClientTable>,
    preferences: Mutex<PreferenceAccount>,
    transport: Arc<dyn Transport>,
    peer_info: Arc<dyn PeerInfoDirectory>,
    bandwidth_target_in: u64,
    bandwidth_target_out: u64,
    pub stats: Stats,
    /// `SEND`s submitted for a peer that isn't a neighbor yet, buffered
    /// until the transport reports a connection (§4.6: "buffer the SEND,
    /// retry on success, drop on failure").
    pending_sends: Mutex<HashMap<PeerId, Vec<PendingSend>>>,
}

struct PendingSend {
    priority: u32,
    deadline: Instant,
    payload: Vec<u8>,
}

impl Dispatcher {
    pub fn new(
        identity: Identity,
        transport: Arc<dyn Transport>,
        peer_info: Arc<dyn PeerInfoDirectory>,
        bandwidth_target_in: u64,
        bandwidth_target_out: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            neighbors: RwLock::new(HashMap::new()),
            clients: Mutex::new(ClientTable::new()),
            preferences: Mutex::new(PreferenceAccount::new()),
            transport,
            peer_info,
            bandwidth_target_in,
            bandwidth_target_out,
            stats: Stats::new(),
            pending_sends: Mutex::new(HashMap::new()),
        })
    }

    /// Handle one event reported by the transport (§4.7).
    pub async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer } => self.on_connect(peer).await,
            TransportEvent::Disconnected { peer } => self.on_disconnect(peer).await,
            TransportEvent::Received {
                peer,
                message_type: mt,
                body,
            } => self.on_received(peer, mt, body).await,
        }
    }

    async fn on_connect(self: &Arc<Self>, peer: PeerId) {
        let now = Instant::now();
        let neighbor = Arc::new(Mutex::new(Neighbor::new(peer, None, now)));
        self.neighbors.write().await.insert(peer, neighbor.clone());
        self.spawn_quota_task(peer, neighbor.clone()).await;
        self.send_key(peer, neighbor.clone()).await;
        self.flush_pending_sends(peer, neighbor).await;
    }

    /// Retry every `SEND` buffered for `peer` while it was not yet a
    /// neighbor, now that the transport has connected it (§4.6).
    async fn flush_pending_sends(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let buffered = self.pending_sends.lock().await.remove(&peer);
        let Some(buffered) = buffered else { return };
        use crate::neighbor::queue::InsertOutcome;
        let mut guard = neighbor.lock().await;
        for pending in buffered {
            let entry = crate::neighbor::queue::PlaintextEntry::new(
                pending.deadline,
                pending.priority,
                pending.payload,
            );
            match guard.plaintext_queue.insert(entry) {
                InsertOutcome::Inserted => {}
                InsertOutcome::RejectedQueueFull => self.stats.record_drop_queue_full(),
            }
        }
        drop(guard);
        self.process_plaintext(peer, neighbor).await;
    }

    async fn on_disconnect(self: &Arc<Self>, peer: PeerId) {
        let removed = self.neighbors.write().await.remove(&peer);
        if let Some(neighbor) = removed {
            let mut guard = neighbor.lock().await;
            guard.cancel_all_tasks();
            let preference = guard.current_preference;
            drop(guard);
            self.preferences.lock().await.remove(preference);
        }
        self.clients.lock().await.notify_disconnect(peer);
    }

    async fn on_received(self: &Arc<Self>, peer: PeerId, mt: u16, body: Vec<u8>) {
        let neighbor = {
            let neighbors = self.neighbors.read().await;
            neighbors.get(&peer).cloned()
        };
        let Some(neighbor) = neighbor else {
            tracing::warn!(?peer, "received datagram from unknown neighbor");
            return;
        };

        match mt {
            message_type::SET_KEY => self.handle_set_key(peer, neighbor, &body).await,
            message_type::PING => self.handle_ping(peer, neighbor, &body).await,
            message_type::PONG => self.handle_pong(peer, neighbor, &body).await,
            message_type::ENCRYPTED_MESSAGE => self.handle_encrypted_message(peer, neighbor, &body).await,
            other => {
                tracing::warn!(?peer, message_type = other, "unknown message type, dropping");
            }
        }
    }

    /// Begin or continue the key-exchange handshake for `peer` (§4.2).
    async fn send_key(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let mut guard = neighbor.lock().await;
        if guard.peer_public_key.is_none() {
            if guard.peer_info_lookup.is_none() {
                let dispatcher = self.clone();
                let peer_info = self.peer_info.clone();
                let neighbor_for_task = neighbor.clone();
                let handle = tokio::spawn(async move {
                    if let Ok(Ok(Some(public_key))) = tokio::time::timeout(
                        PEER_INFO_LOOKUP_TIMEOUT,
                        async { Ok::<_, Error>(peer_info.lookup(peer).await) },
                    )
                    .await
                    {
                        let identity = Identity::from_public_key(public_key);
                        {
                            let mut guard = neighbor_for_task.lock().await;
                            guard.peer_public_key = Some(identity);
                            guard.peer_info_lookup = None;
                        }
                        dispatcher.send_key(peer, neighbor_for_task).await;
                    }
                });
                guard.peer_info_lookup = Some(handle);
            }
            return;
        }

        let Some(transition_outcome) = transition(guard.kx_state, KxEvent::SendKey) else {
            return;
        };
        guard.kx_state = transition_outcome.next;

        let session_key = guard.ensure_own_session_key();
        let peer_identity = guard.peer_public_key.clone().expect("checked above");
        let encrypted_session_key = match peer_identity.encrypt_session_key(&session_key.key) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(?peer, error = %e, "failed to encrypt session key");
                return;
            }
        };

        let set_key = match SetKeyEnvelope::build(
            guard.kx_state.as_wire_value(),
            session_key.created_at,
            encrypted_session_key,
            peer,
            |msg| self.identity.sign(msg),
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(?peer, error = %e, "failed to sign set_key envelope");
                return;
            }
        };

        let challenge = guard.issue_challenge();
        let ping = PingPongBody { challenge, target: peer };
        let encrypted_ping = crate::crypto::cipher::encrypt_body(&session_key.key, &ping.encode());

        if let Some(previous) = guard.key_retry_task.take() {
            previous.abort();
        }
        let retry_after = guard.set_key_retry_frequency;
        guard.set_key_retry_frequency *= 2;
        let dispatcher = self.clone();
        let retry_neighbor = neighbor.clone();
        guard.key_retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(retry_after).await;
            dispatcher.send_key(peer, retry_neighbor).await;
        }));
        drop(guard);

        let _ = self.transport.send(peer, set_key.encode()).await;
        let _ = self
            .transport
            .send(peer, frame_ping(message_type::PING, &encrypted_ping))
            .await;
    }

    async fn handle_set_key(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>, body: &[u8]) {
        let envelope = match SetKeyEnvelope::decode(body) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(?peer, error = %e, "malformed set_key envelope");
                self.stats.record_drop_protocol_violation();
                return;
            }
        };
        let our_identity = self.identity.peer_id();
        if let Err(e) = envelope.validate_fixed_fields(envelope.purpose_size, &our_identity) {
            tracing::warn!(?peer, error = %e, "set_key failed fixed-field validation");
            self.stats.record_drop_protocol_violation();
            return;
        }

        let mut guard = neighbor.lock().await;
        let peer_identity = match &guard.peer_public_key {
            Some(identity) => identity.clone(),
            None => {
                drop(guard);
                tracing::debug!(?peer, "set_key received before public key resolved, triggering lookup");
                self.send_key(peer, neighbor.clone()).await;
                return;
            }
        };
        if peer_identity.verify(&envelope.signed_bytes(), &envelope.signature).is_err() {
            tracing::warn!(?peer, "set_key signature verification failed");
            self.stats.record_drop_protocol_violation();
            return;
        }

        // Replay guard: if we already accepted a SET_KEY while KEY_RECEIVED
        // or above, the new creation time must be strictly greater (§4.1 item 4).
        if guard.kx_state.has_peer_key() {
            if let Some(current) = &guard.peer_session_key {
                if envelope.session_key_created_at <= current.created_at {
                    tracing::debug!(?peer, "stale set_key dropped (replay guard)");
                    self.stats.record_drop_protocol_violation();
                    return;
                }
            }
        }

        let decrypted_key = match self.identity.decrypt_session_key(&envelope.encrypted_session_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(?peer, error = %e, "failed to decrypt set_key session key");
                self.stats.record_drop_protocol_violation();
                return;
            }
        };
        let new_session_key = SessionKey::from_parts(decrypted_key, envelope.session_key_created_at);
        guard.accept_peer_session_key(new_session_key);

        let Some(outcome) = transition(
            guard.kx_state,
            KxEvent::ValidSetKey {
                peer_reported_state: envelope.sender_state,
            },
        ) else {
            return;
        };
        guard.kx_state = outcome.next;
        if outcome.reset_inbound_sequence {
            guard.replay_window.reset();
        }

        let buffered_ping = guard.take_buffered_ping();
        drop(guard);

        if outcome.reply_set_key {
            self.send_key(peer, neighbor.clone()).await;
        }
        if let Some(ping) = buffered_ping {
            self.process_ping_body(peer, neighbor.clone(), ping).await;
        }
    }

    async fn handle_ping(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>, body: &[u8]) {
        let guard = neighbor.lock().await;
        if !guard.kx_state.has_peer_key() {
            drop(guard);
            let mut guard = neighbor.lock().await;
            if let Ok(decrypted) = self.decrypt_peer_key_body(&guard, body) {
                if let Ok(ping) = PingPongBody::decode(&decrypted) {
                    guard.buffer_ping(ping);
                }
            }
            return;
        }
        let session_key = guard.peer_session_key;
        drop(guard);
        let Some(session_key) = session_key else { return };
        let Ok(encrypted_body) = EncryptedBody::decode(body) else {
            return;
        };
        let Ok(plaintext) = crate::crypto::cipher::decrypt_body(&session_key.key, &encrypted_body) else {
            tracing::warn!(?peer, "ping failed integrity check");
            self.stats.record_drop_protocol_violation();
            return;
        };
        let Ok(ping) = PingPongBody::decode(&plaintext) else {
            return;
        };
        self.process_ping_body(peer, neighbor, ping).await;
    }

    async fn process_ping_body(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>, ping: PingPongBody) {
        let guard = neighbor.lock().await;
        let Some(peer_session_key) = guard.peer_session_key else {
            return;
        };
        drop(guard);
        let pong = PingPongBody {
            challenge: ping.challenge,
            target: peer,
        };
        let encrypted = crate::crypto::cipher::encrypt_body(&peer_session_key.key, &pong.encode());
        let _ = self
            .transport
            .send(peer, frame_ping(message_type::PONG, &encrypted))
            .await;
    }

    async fn handle_pong(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>, body: &[u8]) {
        let mut guard = neighbor.lock().await;
        let Some(session_key) = guard.own_session_key else {
            return;
        };
        let Ok(encrypted_body) = EncryptedBody::decode(body) else {
            return;
        };
        let Ok(plaintext) = crate::crypto::cipher::decrypt_body(&session_key.key, &encrypted_body) else {
            tracing::warn!(?peer, "pong failed integrity check");
            return;
        };
        let Ok(pong) = PingPongBody::decode(&plaintext) else {
            return;
        };
        let expected = guard.outstanding_challenge;
        let event = match expected {
            Some(challenge) if challenge == pong.challenge => {
                guard.outstanding_challenge = None;
                KxEvent::ValidPong
            }
            _ => KxEvent::DuplicatePong,
        };
        let Some(outcome) = transition(guard.kx_state, event) else {
            return;
        };
        guard.kx_state = outcome.next;
        if outcome.confirmed {
            guard.session_established = Some(Instant::now());
            guard.last_activity = Instant::now();
            if let Some(handle) = guard.key_retry_task.take() {
                handle.abort();
            }
        }
        drop(guard);

        if outcome.confirmed {
            self.stats.record_handshake_completed();
            self.clients.lock().await.notify_connect(peer);
            self.drain_encrypted_queue(peer, neighbor).await;
        }
    }

    async fn handle_encrypted_message(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>, body: &[u8]) {
        let mut guard = neighbor.lock().await;
        let Some(session_key) = guard.peer_session_key else {
            return;
        };
        let now = SystemTime::now();
        match process_encrypted_message(&session_key, &mut guard.replay_window, body, now) {
            Ok(batch) => {
                guard.last_activity = Instant::now();
                guard.bpm_out_external_limit = batch.quota_hint as u64;
                guard.recompute_bpm_out();
                let quota_bpm = guard.current_bpm_in;
                guard.recv_window.refresh(Instant::now(), quota_bpm);
                drop(guard);

                self.stats.record_received(body.len() as u64);
                let mut clients = self.clients.lock().await;
                for message in batch.messages {
                    clients.fan_out_inbound(peer, message.message_type, &message.payload, NOTIFICATION_HEADER_CAP);
                }
            }
            Err(reason) => {
                drop(guard);
                match reason {
                    RejectReason::Replay(_) => {
                        tracing::debug!(?peer, ?reason, "inbound datagram rejected");
                        self.stats.record_drop_replay();
                    }
                    RejectReason::TooStale => {
                        tracing::debug!(?peer, ?reason, "inbound datagram too old");
                        self.stats.record_drop_stale();
                    }
                    RejectReason::IntegrityCheckFailed => {
                        tracing::warn!(?peer, ?reason, "inbound datagram failed integrity check");
                        self.stats.record_drop_protocol_violation();
                    }
                }
            }
        }
    }

    /// Run the scheduler for one neighbor and push the result to transport
    /// (§4.3).
    pub async fn process_plaintext(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let mut guard = neighbor.lock().await;
        if !guard.kx_state.is_confirmed() || !guard.encrypted_queue.is_empty() {
            return;
        }
        let now = Instant::now();
        guard.send_window.refresh(now, guard.current_bpm_out);
        let available = guard.send_window.available();
        let quota = guard.current_bpm_out;

        match scheduler::select_batch(&mut guard.plaintext_queue, now, available, quota, MAX_ENCRYPTED_MESSAGE_SIZE) {
            BatchDecision::Empty => {}
            BatchDecision::Defer { retry_after } => {
                let dispatcher = self.clone();
                let neighbor = neighbor.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(retry_after).await;
                    dispatcher.process_plaintext(peer, neighbor).await;
                });
            }
            BatchDecision::Emit(selected) => {
                let session_key = guard.ensure_own_session_key();
                guard.next_outbound_sequence = guard.next_outbound_sequence.wrapping_add(1);
                let sequence_number = guard.next_outbound_sequence;
                let quota_hint = guard.current_bpm_in as u32;
                let now_secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let datagram = scheduler::build_datagram(&session_key, sequence_number, quota_hint, now_secs, &selected);
                guard.send_window.spend(datagram.bytes.len() as u64);
                guard.encrypted_queue.push_back(datagram);
                drop(guard);

                // Before the batch is out of reach, fan each selected entry
                // out to clients that subscribed to see outbound traffic
                // (§4.3 "Notification fan-out").
                let mut clients = self.clients.lock().await;
                for entry in &selected {
                    if let Some((message_type, body)) = split_framed_inner_message(&entry.payload) {
                        clients.fan_out_outbound(peer, message_type, body, NOTIFICATION_HEADER_CAP);
                    }
                }
                drop(clients);

                self.drain_encrypted_queue(peer, neighbor).await;
            }
        }
    }

    /// Push the head of the encrypted queue to the transport, one in-flight
    /// request at a time (§4.3 step 5, P7).
    async fn drain_encrypted_queue(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let mut guard = neighbor.lock().await;
        let Some(entry) = guard.encrypted_queue.pop_front() else {
            return;
        };
        let len = entry.bytes.len() as u64;
        drop(guard);
        if self.transport.send(peer, entry.bytes).await.is_ok() {
            self.stats.record_sent(len);
        }
    }

    async fn spawn_quota_task(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let dispatcher = self.clone();
        let task_neighbor = neighbor.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(QUOTA_RECOMPUTE_PERIOD);
            loop {
                ticker.tick().await;
                dispatcher.recompute_quota(peer, task_neighbor.clone()).await;
            }
        });
        neighbor.lock().await.quota_update_task = Some(handle);
    }

    async fn recompute_quota(self: &Arc<Self>, peer: PeerId, neighbor: Arc<Mutex<Neighbor>>) {
        let neighbor_count = self.neighbors.read().await.len();
        let preference_sum = self.preferences.lock().await.sum();
        let mut guard = neighbor.lock().await;
        let inputs = QuotaInputs {
            current_preference: guard.current_preference,
            preference_sum,
            neighbor_count,
            bandwidth_target_out: self.bandwidth_target_out,
            last_activity: guard.last_activity,
            session_established: guard.session_established,
            now: Instant::now(),
        };
        let decision = compute_quota(&inputs, guard.current_bpm_in);
        guard.current_bpm_in = decision.q_in;
        let bpm_out = guard.current_bpm_out;
        let should_notify = decision.should_notify_transport;
        drop(guard);

        if should_notify {
            let _ = self.transport.set_quota(peer, decision.q_in, bpm_out).await;
        }
        if decision.idle_disconnect {
            self.stats.record_idle_disconnect();
            let _ = self.transport.disconnect(peer).await;
        }
    }

    /// `INIT`: register a client and reply with the local public key plus a
    /// replay of every currently connected neighbor (§4.6).
    pub async fn client_init(self: &Arc<Self>, options: ClientOptions, subscribed_types: Vec<u16>) -> ClientIndex {
        let index = self.clients.lock().await.register(options, subscribed_types);
        let peers: Vec<PeerId> = self.neighbors.read().await.keys().copied().collect();
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get_mut(index) {
            for peer in peers {
                client.enqueue(Notification::Connect(peer));
            }
        }
        index
    }

    /// `REQUEST_INFO`: accumulate preference and (optionally) reserve inbound
    /// window budget for `peer` (§4.5).
    pub async fn client_request_info(
        self: &Arc<Self>,
        peer: PeerId,
        preference_delta: u64,
        reserve_amount: i64,
    ) -> Result<(i64, u64, u64, u64)> {
        let neighbors = self.neighbors.read().await;
        let neighbor = neighbors.get(&peer).cloned().ok_or(Error::UnknownNeighbor(peer))?;
        drop(neighbors);

        let mut guard = neighbor.lock().await;
        let mut preferences = self.preferences.lock().await;
        preferences.accumulate(&mut guard.current_preference, preference_delta);
        drop(preferences);

        guard.recv_window.refresh(Instant::now(), guard.current_bpm_in);
        let reserved = guard.recv_window.reserve_clamped(reserve_amount);
        Ok((reserved, guard.current_bpm_in, guard.current_bpm_out, guard.current_preference))
    }

    /// `SEND`: enqueue a client-submitted plaintext message for `peer`
    /// (§4.3, §4.6). If the peer is not yet a neighbor, ask the transport to
    /// connect, buffer the send, and retry it once the transport reports the
    /// connection; a failed connect attempt drops the send instead.
    pub async fn client_send(
        self: &Arc<Self>,
        peer: PeerId,
        priority: u32,
        deadline: Instant,
        payload: Vec<u8>,
    ) -> Result<()> {
        let neighbor = {
            let neighbors = self.neighbors.read().await;
            neighbors.get(&peer).cloned()
        };
        let Some(neighbor) = neighbor else {
            self.transport.connect(peer).await?;
            self.pending_sends.lock().await.entry(peer).or_default().push(PendingSend {
                priority,
                deadline,
                payload,
            });
            return Ok(());
        };
        let mut guard = neighbor.lock().await;
        let entry = crate::neighbor::queue::PlaintextEntry::new(deadline, priority, payload);
        use crate::neighbor::queue::InsertOutcome;
        match guard.plaintext_queue.insert(entry) {
            InsertOutcome::Inserted => {}
            InsertOutcome::RejectedQueueFull => {
                self.stats.record_drop_queue_full();
                return Err(Error::QueueFull);
            }
        }
        drop(guard);
        self.process_plaintext(peer, neighbor).await;
        Ok(())
    }

    /// `REQUEST_CONNECT`: forward as a zero-size, zero-priority address hint
    /// (§4.6), notifying `SEND_PRE_CONNECT` subscribers that a connection
    /// attempt is underway.
    pub async fn client_request_connect(self: &Arc<Self>, peer: PeerId) {
        self.clients.lock().await.notify_pre_connect(peer);
        let _ = self.transport.connect(peer).await;
    }

    /// This neighbor's current KX state, for introspection (admin surfaces,
    /// tests). `None` if `peer` is not currently a neighbor.
    pub async fn neighbor_state(&self, peer: PeerId) -> Option<KxState> {
        let neighbors = self.neighbors.read().await;
        let neighbor = neighbors.get(&peer)?.clone();
        drop(neighbors);
        Some(neighbor.lock().await.kx_state)
    }

    /// A clone of the shared handle to `peer`'s neighbor record, for
    /// introspection or direct manipulation in tests.
    pub async fn neighbor_handle(&self, peer: PeerId) -> Option<Arc<Mutex<Neighbor>>> {
        self.neighbors.read().await.get(&peer).cloned()
    }

    /// Number of currently connected neighbors.
    pub async fn neighbor_count(&self) -> usize {
        self.neighbors.read().await.len()
    }

    /// Force an out-of-cycle quota recompute for `peer`, bypassing the 1s
    /// periodic task -- useful after a global bandwidth-target change, and
    /// in tests that can't wait out a real quota tick.
    pub async fn force_quota_recompute(self: &Arc<Self>, peer: PeerId) {
        if let Some(neighbor) = self.neighbor_handle(peer).await {
            self.recompute_quota(peer, neighbor).await;
        }
    }

    /// Drain every notification currently queued for `client`, in delivery
    /// order.
    pub async fn drain_client_notifications(&self, client: ClientIndex) -> Vec<Notification> {
        let mut clients = self.clients.lock().await;
        clients.get_mut(client).map(|c| c.drain()).unwrap_or_default()
    }

    /// Cancel every neighbor's background tasks and drop all queued state,
    /// for a clean process exit (§11 "Graceful shutdown").
    pub async fn shutdown(self: &Arc<Self>) {
        let mut neighbors = self.neighbors.write().await;
        for (_, neighbor) in neighbors.drain() {
            neighbor.lock().await.cancel_all_tasks();
        }
    }

    fn decrypt_peer_key_body(&self, guard: &Neighbor, body: &[u8]) -> Result<Vec<u8>> {
        let session_key = guard
            .peer_session_key
            .ok_or_else(|| Error::Crypto("no peer session key yet".into()))?;
        let encrypted_body = EncryptedBody::decode(body)?;
        crate::crypto::cipher::decrypt_body(&session_key.key, &encrypted_body)
    }
}

/// Parse a client-submitted plaintext entry's payload as one length-prefixed
/// inner message (`{u16 size; u16 type;}` followed by `size - 4` bytes of
/// body), the same framing the inbound pipeline splits a batch into (§4.4).
/// Returns `None` if the payload is shorter than a header.
fn split_framed_inner_message(payload: &[u8]) -> Option<(u16, &[u8])> {
    if payload.len() < MessageHeader::WIRE_SIZE {
        return None;
    }
    let message_type = u16::from_be_bytes([payload[2], payload[3]]);
    Some((message_type, &payload[MessageHeader::WIRE_SIZE..]))
}

fn frame_ping(mt: u16, body: &EncryptedBody) -> Vec<u8> {
    let encoded = body.encode();
    let header = MessageHeader {
        size: (MessageHeader::WIRE_SIZE + encoded.len()) as u16,
        message_type: mt,
    };
    let mut out = Vec::with_capacity(header.size as usize);
    header.encode(&mut out);
    out.extend_from_slice(&encoded);
    out
}
