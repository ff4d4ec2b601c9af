//! Inbound pipeline: decrypt, replay-check, split, and prepare for fan-out
//! (§4.4).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};

use crate::crypto::cipher::decrypt_body;
use crate::crypto::identity::SessionKey;
use crate::envelope::{BatchBody, EncryptedEnvelope};
use crate::error::{Error, Result};
use crate::neighbor::replay::{ReplayOutcome, ReplayWindow};
use crate::protocol::constants::MAX_MESSAGE_AGE;

/// One length-prefixed inner message extracted from a decrypted batch.
#[derive(Debug, Clone)]
pub struct InnerMessage {
    pub message_type: u16,
    pub payload: Vec<u8>,
}

/// Result of processing one inbound `ENCRYPTED_MESSAGE` (§4.4).
#[derive(Debug)]
pub struct InboundBatch {
    pub sequence_number: u32,
    pub quota_hint: u32,
    pub messages: Vec<InnerMessage>,
}

/// Why an inbound datagram was rejected, for logging at the right level
/// (§7 kinds 2 and 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    IntegrityCheckFailed,
    Replay(ReplayOutcomeKind),
    TooStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcomeKind {
    DuplicateHighest,
    DuplicateWithinWindow,
    TooOld,
}

/// Decrypt, validate, and split one received datagram's body into inner
/// messages. `replay_window` is mutated only on acceptance.
pub fn process_encrypted_message(
    session_key: &SessionKey,
    replay_window: &mut ReplayWindow,
    body: &[u8],
    now: SystemTime,
) -> std::result::Result<InboundBatch, RejectReason> {
    let envelope = EncryptedEnvelope::decode(body).map_err(|_| RejectReason::IntegrityCheckFailed)?;
    let plaintext =
        decrypt_body(&session_key.key, &envelope.body).map_err(|_| RejectReason::IntegrityCheckFailed)?;
    let batch = BatchBody::decode(&plaintext).map_err(|_| RejectReason::IntegrityCheckFailed)?;

    match replay_window.check(batch.sequence_number) {
        ReplayOutcome::AcceptNewHighest | ReplayOutcome::AcceptWithinWindow => {}
        ReplayOutcome::DuplicateHighest => {
            return Err(RejectReason::Replay(ReplayOutcomeKind::DuplicateHighest))
        }
        ReplayOutcome::DuplicateWithinWindow => {
            return Err(RejectReason::Replay(ReplayOutcomeKind::DuplicateWithinWindow))
        }
        ReplayOutcome::TooOld => return Err(RejectReason::Replay(ReplayOutcomeKind::TooOld)),
    }

    let sent_at = UNIX_EPOCH + Duration::from_secs(batch.timestamp);
    let age = now
        .duration_since(sent_at)
        .unwrap_or(Duration::ZERO);
    if age > MAX_MESSAGE_AGE {
        return Err(RejectReason::TooStale);
    }

    replay_window.accept(batch.sequence_number);

    let messages = split_inner_messages(&batch.inner_messages).map_err(|_| RejectReason::IntegrityCheckFailed)?;

    Ok(InboundBatch {
        sequence_number: batch.sequence_number,
        quota_hint: batch.quota_hint,
        messages,
    })
}

/// Split a batch's inner-message region into length-prefixed messages.
/// Headers may land at unaligned offsets; copy to scratch before reading
/// the size field (§4.4).
fn split_inner_messages(buf: &[u8]) -> Result<Vec<InnerMessage>> {
    const HEADER_SIZE: usize = 4;
    let mut messages = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        if buf.len() - offset < HEADER_SIZE {
            return Err(Error::Protocol("inner message header truncated".into()));
        }
        let mut scratch = [0u8; HEADER_SIZE];
        scratch.copy_from_slice(&buf[offset..offset + HEADER_SIZE]);
        let size = BigEndian::read_u16(&scratch[0..2]) as usize;
        let message_type = BigEndian::read_u16(&scratch[2..4]);
        let body_start = offset + HEADER_SIZE;
        if size < HEADER_SIZE || body_start + (size - HEADER_SIZE) > buf.len() {
            return Err(Error::Protocol("inner message size out of range".into()));
        }
        let body_end = body_start + (size - HEADER_SIZE);
        messages.push(InnerMessage {
            message_type,
            payload: buf[body_start..body_end].to_vec(),
        });
        offset = body_end;
    }
    Ok(messages)
}
