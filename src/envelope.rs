//! On-wire envelope types: `SET_KEY`, `ENCRYPTED_MESSAGE`, and the PING/PONG
//! bodies carried inside an encrypted batch (§4.1, §6).

use byteorder::{BigEndian, ByteOrder};

use crate::crypto::cipher::EncryptedBody;
use crate::error::{Error, Result};
use crate::protocol::{message_type, MessageHeader, PeerId};

/// Fixed purpose tag identifying a `SET_KEY` envelope's signed region (§4.1).
pub const SET_KEY_PURPOSE: u32 = 0x534B_4559; // "SKEY"

/// Key-exchange envelope carrying an RSA-wrapped session key (§4.1).
#[derive(Debug, Clone)]
pub struct SetKeyEnvelope {
    /// The sender's KX state at the time of sending, mirrored back so the
    /// receiver can decide whether to reply (§4.2).
    pub sender_state: u32,
    pub purpose_size: u32,
    pub purpose: u32,
    pub session_key_created_at: u64,
    pub encrypted_session_key: Vec<u8>,
    pub target: PeerId,
    pub signature: Vec<u8>,
}

impl SetKeyEnvelope {
    /// Region covered by the signature: everything but the signature itself.
    fn signed_region(
        sender_state: u32,
        purpose_size: u32,
        purpose: u32,
        session_key_created_at: u64,
        encrypted_session_key: &[u8],
        target: &PeerId,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + encrypted_session_key.len() + target.len());
        buf.extend_from_slice(&sender_state.to_be_bytes());
        buf.extend_from_slice(&purpose_size.to_be_bytes());
        buf.extend_from_slice(&purpose.to_be_bytes());
        buf.extend_from_slice(&session_key_created_at.to_be_bytes());
        buf.extend_from_slice(encrypted_session_key);
        buf.extend_from_slice(target);
        buf
    }

    pub fn build(
        sender_state: u32,
        session_key_created_at: u64,
        encrypted_session_key: Vec<u8>,
        target: PeerId,
        sign: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<Self> {
        let purpose_size = encrypted_session_key.len() as u32;
        let region = Self::signed_region(
            sender_state,
            purpose_size,
            SET_KEY_PURPOSE,
            session_key_created_at,
            &encrypted_session_key,
            &target,
        );
        let signature = sign(&region)?;
        Ok(Self {
            sender_state,
            purpose_size,
            purpose: SET_KEY_PURPOSE,
            session_key_created_at,
            encrypted_session_key,
            target,
            signature,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let region = Self::signed_region(
            self.sender_state,
            self.purpose_size,
            self.purpose,
            self.session_key_created_at,
            &self.encrypted_session_key,
            &self.target,
        );
        let header = MessageHeader {
            size: 0, // patched below
            message_type: message_type::SET_KEY,
        };
        let mut body = region;
        body.extend_from_slice(&self.signature);
        let mut out = Vec::with_capacity(MessageHeader::WIRE_SIZE + body.len());
        let total_size = (MessageHeader::WIRE_SIZE + body.len()) as u16;
        MessageHeader {
            size: total_size,
            ..header
        }
        .encode(&mut out);
        out.extend_from_slice(&body);
        out
    }

    /// Decode the body following a `MessageHeader` already stripped by the caller.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < 20 {
            return Err(Error::Protocol("set_key body too short".into()));
        }
        let sender_state = BigEndian::read_u32(&body[0..4]);
        let purpose_size = BigEndian::read_u32(&body[4..8]);
        let purpose = BigEndian::read_u32(&body[8..12]);
        let session_key_created_at = BigEndian::read_u64(&body[12..20]);
        let rest = &body[20..];
        if rest.len() < purpose_size as usize + 32 {
            return Err(Error::Protocol("set_key body truncated".into()));
        }
        let encrypted_session_key = rest[..purpose_size as usize].to_vec();
        let after_key = &rest[purpose_size as usize..];
        let target: PeerId = after_key[..32]
            .try_into()
            .map_err(|_| Error::Protocol("set_key target malformed".into()))?;
        let signature = after_key[32..].to_vec();
        Ok(Self {
            sender_state,
            purpose_size,
            purpose,
            session_key_created_at,
            encrypted_session_key,
            target,
            signature,
        })
    }

    /// Everything this envelope's signature was computed over (for verification).
    pub fn signed_bytes(&self) -> Vec<u8> {
        Self::signed_region(
            self.sender_state,
            self.purpose_size,
            self.purpose,
            self.session_key_created_at,
            &self.encrypted_session_key,
            &self.target,
        )
    }

    /// Validate the fixed fields per §4.1, independent of signature checking
    /// (which requires the peer's public key and is done by the caller).
    pub fn validate_fixed_fields(&self, expected_purpose_size: u32, our_identity: &PeerId) -> Result<()> {
        if self.purpose != SET_KEY_PURPOSE {
            return Err(Error::Protocol("set_key purpose mismatch".into()));
        }
        if self.purpose_size != expected_purpose_size {
            return Err(Error::Protocol("set_key purpose size mismatch".into()));
        }
        if &self.target != our_identity {
            return Err(Error::Protocol("set_key target mismatch".into()));
        }
        Ok(())
    }
}

/// An `ENCRYPTED_MESSAGE` envelope as it travels on the wire: a plaintext
/// header plus a plaintext-hash-prefixed ciphertext (§4.1, §6).
#[derive(Debug, Clone)]
pub struct EncryptedEnvelope {
    pub body: EncryptedBody,
}

impl EncryptedEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let encoded_body = self.body.encode();
        let total_size = (MessageHeader::WIRE_SIZE + 4 + encoded_body.len()) as u16;
        let header = MessageHeader {
            size: total_size,
            message_type: message_type::ENCRYPTED_MESSAGE,
        };
        let mut out = Vec::with_capacity(total_size as usize);
        header.encode(&mut out);
        out.extend_from_slice(&0u32.to_be_bytes()); // reserved
        out.extend_from_slice(&encoded_body);
        out
    }

    /// Decode the body following a `MessageHeader` already stripped by the caller.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < 4 {
            return Err(Error::Protocol("encrypted envelope missing reserved field".into()));
        }
        let encrypted_body = EncryptedBody::decode(&body[4..])?;
        Ok(Self {
            body: encrypted_body,
        })
    }
}

/// Plaintext body of an `ENCRYPTED_MESSAGE`, decrypted from `EncryptedBody` (§4.1).
#[derive(Debug, Clone)]
pub struct BatchBody {
    pub sequence_number: u32,
    pub quota_hint: u32,
    pub timestamp: u64,
    /// Concatenated, length-prefixed inner messages.
    pub inner_messages: Vec<u8>,
}

impl BatchBody {
    const HEADER_SIZE: usize = 16;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_SIZE + self.inner_messages.len());
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.quota_hint.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.inner_messages);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(Error::Protocol("batch body shorter than header".into()));
        }
        let sequence_number = BigEndian::read_u32(&buf[0..4]);
        let quota_hint = BigEndian::read_u32(&buf[4..8]);
        let timestamp = BigEndian::read_u64(&buf[8..16]);
        Ok(Self {
            sequence_number,
            quota_hint,
            timestamp,
            inner_messages: buf[Self::HEADER_SIZE..].to_vec(),
        })
    }
}

/// PING/PONG body: a random challenge plus the intended target identity (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPongBody {
    pub challenge: u32,
    pub target: PeerId,
}

impl PingPongBody {
    pub const WIRE_SIZE: usize = 4 + 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        out.extend_from_slice(&self.challenge.to_be_bytes());
        out.extend_from_slice(&self.target);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(Error::Protocol("ping/pong body too short".into()));
        }
        let challenge = BigEndian::read_u32(&buf[0..4]);
        let target: PeerId = buf[4..36]
            .try_into()
            .map_err(|_| Error::Protocol("ping/pong target malformed".into()))?;
        Ok(Self { challenge, target })
    }
}
