//! Error types for xfer-seal.

use thiserror::Error;
use xfer_core::PlanError;
use xfer_types::ErrorKind;

/// Errors that can occur while sealing or opening chunks.
#[derive(Error, Debug)]
pub enum SealError {
    /// Encryption operation failed (RNG unavailable, cipher failure, oversize input).
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Tag verification failed: wrong key, wrong position, or tampered bytes.
    /// No details provided to prevent oracle leaks.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Sealed input too short to hold a nonce and a tag.
    #[error("sealed chunk truncated: {len} bytes (minimum {min})")]
    Truncated {
        /// Bytes actually present.
        len: usize,
        /// Minimum sealed chunk size.
        min: usize,
    },

    /// Key material could not be decoded.
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    /// Plaintext chunk size exceeds what a single sealed chunk may hold.
    #[error("chunk size {chunk_size} exceeds maximum of {max} bytes")]
    ChunkTooLarge {
        /// Requested plaintext chunk size.
        chunk_size: u64,
        /// Largest accepted chunk size.
        max: usize,
    },

    /// Chunk layout could not be planned.
    #[error("chunk planning failed: {0}")]
    Plan(#[from] PlanError),

    /// Reading or writing a sealed stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SealError {
    /// Error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EncryptionFailed(_) | Self::InvalidKey(_) => ErrorKind::Encryption,
            Self::AuthenticationFailed | Self::Truncated { .. } => ErrorKind::Authentication,
            Self::ChunkTooLarge { .. } => ErrorKind::Planning,
            Self::Plan(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }
}
