//! The transport collaborator's interface (§1 "Out of scope: the
//! underlying transport"). This crate only defines the boundary; a real
//! transport (TCP, QUIC, BLE, whatever) implements it.

use async_trait::async_trait;
use rsa::RsaPublicKey;

use crate::error::Result;
use crate::protocol::PeerId;

/// Events the transport layer reports to the dispatcher (§4.7, §8 scenario 1).
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected { peer: PeerId },
    Disconnected { peer: PeerId },
    Received { peer: PeerId, message_type: u16, body: Vec<u8> },
}

/// What the core asks the transport to do (§4.1, §4.3 step 5, §4.5, §4.6).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ask the transport to establish a connection to `peer`, e.g. following
    /// a client `REQUEST_CONNECT` (§4.6).
    async fn connect(&self, peer: PeerId) -> Result<()>;

    /// Ask the transport to tear down its connection to `peer`, e.g. after
    /// an idle-disconnect quota of zero (§4.5 scenario 6).
    async fn disconnect(&self, peer: PeerId) -> Result<()>;

    /// Push one already-framed datagram to `peer` (§4.3 step 5).
    async fn send(&self, peer: PeerId, datagram: Vec<u8>) -> Result<()>;

    /// Update the transport's enforced inbound/outbound byte-per-minute
    /// quota for `peer` (§4.5 step 5).
    async fn set_quota(&self, peer: PeerId, bpm_in: u64, bpm_out: u64) -> Result<()>;

    fn is_connected(&self, peer: &PeerId) -> bool;
}

/// The peer-info directory collaborator (§1 "Out of scope"): maps a peer
/// identity to its long-term public key via a signed advertisement the core
/// never inspects directly.
#[async_trait]
pub trait PeerInfoDirectory: Send + Sync {
    async fn lookup(&self, peer: PeerId) -> Option<RsaPublicKey>;
}
