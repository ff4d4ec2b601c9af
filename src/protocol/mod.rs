//! Wire protocol types and constants for the overlay core (§6).
//!
//! All multi-byte integers on the wire are network byte order. Every
//! envelope starts with a fixed `MessageHeader { size: u16, type: u16 }`.

use serde::{Deserialize, Serialize};

/// Opaque peer identity: a hash of the peer's long-term public key.
/// Equality and hashing are the only operations the core needs (§3).
pub type PeerId = [u8; 32];

/// Wire message type tags (§6 "Wire protocol").
pub mod message_type {
    pub const SET_KEY: u16 = 1;
    pub const PING: u16 = 2;
    pub const PONG: u16 = 3;
    pub const ENCRYPTED_MESSAGE: u16 = 4;
}

/// Fixed header prefixing every envelope on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub size: u16,
    pub message_type: u16,
}

impl MessageHeader {
    pub const WIRE_SIZE: usize = 4;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.message_type.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        // Headers may arrive at an unaligned offset inside a batch; copy to
        // aligned scratch before reading the size field (§4.4).
        let mut scratch = [0u8; Self::WIRE_SIZE];
        scratch.copy_from_slice(&buf[..Self::WIRE_SIZE]);
        Some(Self {
            size: u16::from_be_bytes([scratch[0], scratch[1]]),
            message_type: u16::from_be_bytes([scratch[2], scratch[3]]),
        })
    }
}

pub mod constants {
    use std::time::Duration;

    /// Default per-peer quota, bytes per minute, absent any other preference signal.
    pub const DEFAULT_BPM_IN_OUT: u64 = 65_536;
    /// Maximum encrypted-message size on the wire.
    pub const MAX_ENCRYPTED_MESSAGE_SIZE: usize = 63 * 1024;
    /// available_send_window / available_recv_window cap, expressed as a duration of quota.
    pub const WINDOW_CAP: Duration = Duration::from_secs(5 * 60);
    /// SET_KEY / PING / PONG are always maximum priority.
    pub const CONTROL_MESSAGE_PRIORITY: u32 = 0x00FF_FFFF;
    /// How far in the past a message's deadline may be before it's discarded outright.
    pub const PAST_EXPIRATION_DISCARD_TIME: Duration = Duration::from_secs(1);
    /// How stale an ENCRYPTED_MESSAGE's embedded timestamp may be before it's rejected.
    pub const MAX_MESSAGE_AGE: Duration = Duration::from_secs(24 * 60 * 60);
    /// Quota recompute period (§4.5).
    pub const QUOTA_RECOMPUTE_PERIOD: Duration = Duration::from_secs(1);
    /// Initial set-key retry interval; doubles on each retry (§4.2).
    pub const INITIAL_SET_KEY_RETRY: Duration = Duration::from_secs(3);
    /// Neighbor plaintext queue capacity (§4.3).
    pub const MAX_PEER_QUEUE_SIZE: usize = 16;
    /// Per-client bounded notification queue capacity (§4.6).
    pub const MAX_CLIENT_QUEUE_SIZE: usize = 32;
    /// Minimum guaranteed outbound quota per connected neighbor (§4.5).
    pub const MIN_BPM_PER_PEER: u64 = 4_096;
    /// Minimum quota delta worth pushing down to the transport (§4.5).
    pub const MIN_BPM_CHANGE: u64 = 32;
    /// A neighbor idle (no activity) longer than this is disconnected (§4.5).
    pub const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
    /// Back-reference array size per neighbor (§5 "Back-references").
    pub const CLIENT_BACKREF_SLOTS: usize = 8;
    /// Implicit deadline for an outstanding peer-info lookup (§5 "Cancellation & timeouts").
    pub const PEER_INFO_LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);
    /// Header-only notification cap: how many leading bytes of a message are
    /// forwarded when a client asked for headers only, or when a full-body
    /// subscriber's payload is too large to copy in one notification
    /// (§4.3 "Notification fan-out", §4.4).
    pub const NOTIFICATION_HEADER_CAP: usize = 128;
}

/// Inner-message notification delivery mode, used by the client multiplexer (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    Full,
    HeaderOnly,
}
