//! Symmetric encryption pipeline (§4.1).
//!
//! Every `ENCRYPTED_MESSAGE` body is prefixed by the SHA-256 hash of the
//! plaintext it carries. That hash doubles as the ChaCha20 IV (its first 12
//! bytes, little-endian counter zero) and, on decrypt, as the integrity
//! check: the receiver decrypts, re-hashes the recovered plaintext, and
//! rejects the message unless the hash matches the one that was sent. This
//! is not a keyed MAC -- an attacker who can flip ciphertext bits can always
//! recompute a hash over whatever plaintext falls out, so the guarantee is
//! tamper-evidence under a secret key, not forgery-resistance the way
//! Poly1305 would provide.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// An encrypted body as it appears on the wire: a 32-byte plaintext hash
/// followed by the ciphertext of equal length to the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBody {
    pub hash: [u8; 32],
    pub ciphertext: Vec<u8>,
}

impl EncryptedBody {
    pub const HASH_SIZE: usize = 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HASH_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::HASH_SIZE {
            return Err(Error::Protocol("encrypted body shorter than hash".into()));
        }
        let mut hash = [0u8; Self::HASH_SIZE];
        hash.copy_from_slice(&buf[..Self::HASH_SIZE]);
        Ok(Self {
            hash,
            ciphertext: buf[Self::HASH_SIZE..].to_vec(),
        })
    }
}

fn iv_from_hash(hash: &[u8; 32]) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&hash[..12]);
    iv
}

/// Encrypt `plaintext` under `session_key`, hashing it first so the hash can
/// serve as both IV and integrity check.
pub fn encrypt_body(session_key: &[u8; 32], plaintext: &[u8]) -> EncryptedBody {
    let hash: [u8; 32] = Sha256::digest(plaintext).into();
    let iv = iv_from_hash(&hash);
    let key = Key::from_slice(session_key);
    let nonce = Nonce::from_slice(&iv);
    let mut cipher = ChaCha20::new(key, nonce);
    let mut ciphertext = plaintext.to_vec();
    cipher.apply_keystream(&mut ciphertext);
    EncryptedBody { hash, ciphertext }
}

/// Decrypt and verify an `EncryptedBody`, rejecting it if the recovered
/// plaintext does not hash back to the carried hash (§4.1, §7 kind 2).
pub fn decrypt_body(session_key: &[u8; 32], body: &EncryptedBody) -> Result<Vec<u8>> {
    let iv = iv_from_hash(&body.hash);
    let key = Key::from_slice(session_key);
    let nonce = Nonce::from_slice(&iv);
    let mut cipher = ChaCha20::new(key, nonce);
    let mut plaintext = body.ciphertext.clone();
    cipher.apply_keystream(&mut plaintext);

    let recomputed: [u8; 32] = Sha256::digest(&plaintext).into();
    if recomputed != body.hash {
        return Err(Error::Protocol(
            "encrypted body failed integrity check".into(),
        ));
    }
    Ok(plaintext)
}
