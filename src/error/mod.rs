//! Error types for the overlay core.
//!
//! Mirrors the error-kind taxonomy the core actually raises: transient
//! transport failures, protocol violations, replay/out-of-window drops,
//! queue saturation, configuration errors, and cryptographic setup
//! failures. Kinds 1-4 are always recovered locally by the caller; kinds
//! 5-6 are fatal and terminate the process (see `Error::is_fatal`).

use thiserror::Error;

/// Result type alias for overlay core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("signature error: {0}")]
    Signature(#[from] rsa::signature::Error),

    #[error("neighbor not found: {0:?}")]
    UnknownNeighbor(crate::protocol::PeerId),

    #[error("client not found")]
    UnknownClient,

    #[error("queue full")]
    QueueFull,

    #[error("invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("key material error: {0}")]
    KeyLoad(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Configuration and cryptographic-setup failures are fatal (§7 kinds 5-6);
    /// everything else is recovered locally by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::KeyLoad(_))
    }
}
