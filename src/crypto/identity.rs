//! Long-term identity: an RSA keypair used both to sign SET_KEY envelopes
//! and to wrap ephemeral session keys sent to a peer (§4.1).

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::protocol::PeerId;

const RSA_KEY_BITS: usize = 2048;

/// This peer's long-term keypair, or the cached long-term public key of a neighbor.
#[derive(Clone)]
pub struct Identity {
    private: Option<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl Identity {
    /// Generate a fresh identity (used for tests and for a peer standing up
    /// with no persisted `HOSTKEY` yet).
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| Error::KeyLoad(format!("failed to generate RSA keypair: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            private: Some(private),
            public,
        })
    }

    /// Load a private identity from PKCS#1 PEM key material (the `HOSTKEY` file, §6).
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| Error::KeyLoad(format!("unreadable host key: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            private: Some(private),
            public,
        })
    }

    /// Wrap a peer's long-term public key learned from the peer-info directory.
    /// Such identities hold no private key and cannot sign or decrypt.
    pub fn from_public_key(public: RsaPublicKey) -> Self {
        Self {
            private: None,
            public,
        }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Peer identity: a hash of the long-term public key (§3).
    pub fn peer_id(&self) -> PeerId {
        use sha2::{Digest, Sha256 as Sha2_256};
        let mut hasher = Sha2_256::new();
        hasher.update(self.public.n().to_bytes_be());
        hasher.update(self.public.e().to_bytes_be());
        hasher.finalize().into()
    }

    /// Sign `message` with this identity's private key. Used for the SET_KEY
    /// signature over the purpose region (§4.1).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::Crypto("signing requires a private key".into()))?;
        let signing_key = SigningKey::<Sha256>::new(private.clone());
        let mut rng = OsRng;
        let signature = signing_key.sign_with_rng(&mut rng, message);
        Ok(signature.to_vec())
    }

    /// Verify `signature` over `message` under this identity's long-term public key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::<Sha256>::new(self.public.clone());
        let signature = Signature::try_from(signature)
            .map_err(|e| Error::Protocol(format!("malformed signature: {e}")))?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| Error::Protocol("signature verification failed".into()))
    }

    /// RSA-OAEP-encrypt a session key under this (peer's) long-term public key,
    /// producing the SET_KEY envelope's fixed-size encrypted blob.
    pub fn encrypt_session_key(&self, session_key: &[u8; 32]) -> Result<Vec<u8>> {
        let mut rng = OsRng;
        self.public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), session_key)
            .map_err(Error::Rsa)
    }

    /// Decrypt a SET_KEY envelope's encrypted blob with our own private key.
    pub fn decrypt_session_key(&self, blob: &[u8]) -> Result<[u8; 32]> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::Crypto("decryption requires a private key".into()))?;
        let plain = private
            .decrypt(Oaep::new::<Sha256>(), blob)
            .map_err(Error::Rsa)?;
        if plain.len() != 32 {
            return Err(Error::Crypto("decrypted session key has wrong length".into()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&plain);
        Ok(key)
    }
}

/// An ephemeral symmetric key used for one direction of encrypted traffic
/// between two peers (§3 "Session key").
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionKey {
    pub key: [u8; 32],
    /// Creation timestamp, seconds since the epoch (network byte order on the wire).
    pub created_at: u64,
}

impl SessionKey {
    /// Generate a fresh session key stamped with the current time.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self { key, created_at }
    }

    pub fn from_parts(key: [u8; 32], created_at: u64) -> Self {
        Self { key, created_at }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
