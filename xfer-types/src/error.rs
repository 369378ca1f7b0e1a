//! Error types for pwx-xfer.

use thiserror::Error;

/// Classification of every failure an upload or decryption can end in.
///
/// Each crate keeps its own error enum; all of them map onto one of these
/// kinds so the upload state machine can record why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid chunk size or an empty source, caught before any network I/O.
    Planning,
    /// CSPRNG unavailable or cipher initialization failed.
    Encryption,
    /// Transport-level failure (connection, timeout, non-success status).
    Network,
    /// The server answered with something the protocol does not allow.
    ProtocolViolation,
    /// AEAD tag verification failed on the decrypt path.
    Authentication,
    /// Reading the source file or writing output failed locally.
    Io,
    /// The caller aborted the upload.
    Cancelled,
}

impl ErrorKind {
    /// Whether resubmitting the same chunk may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Planning => "planning error",
            Self::Encryption => "encryption error",
            Self::Network => "network error",
            Self::ProtocolViolation => "protocol violation",
            Self::Authentication => "authentication error",
            Self::Io => "local I/O error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors decoding data received from the submit-chunk endpoint.
#[derive(Debug, Error)]
pub enum WireError {
    /// Response body was not valid acknowledgment JSON.
    #[error("malformed acknowledgment: {0}")]
    MalformedAck(#[source] serde_json::Error),

    /// A field carried a value the protocol does not allow.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl WireError {
    /// Every wire decoding failure is a protocol violation.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ProtocolViolation
    }
}
