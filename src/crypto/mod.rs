//! Cryptographic primitives for the overlay core (§4.1).
//!
//! Two concerns live here: `identity` holds the long-term RSA keypair used
//! to sign SET_KEY envelopes and to wrap ephemeral session keys, and
//! `cipher` holds the symmetric encrypt/decrypt pipeline whose plaintext
//! hash doubles as both integrity check and cipher IV.

pub mod cipher;
pub mod identity;

pub use cipher::{decrypt_body, encrypt_body, EncryptedBody};
pub use identity::{Identity, SessionKey};
