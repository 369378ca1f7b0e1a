//! Transport abstraction for chunk submission.
//!
//! One call to [`ChunkTransport::submit_chunk`] is one request to the
//! submit-chunk endpoint: a sealed chunk plus its position, answered by an
//! [`Acknowledgment`]. The upload driver only talks to this trait, so the
//! HTTP client, the retry wrapper and the test mock are interchangeable.
//!
//! # Example
//!
//! ```ignore
//! let transport = RetryingTransport::new(HttpTransport::new(endpoint)?, 3);
//! let ack = transport.submit_chunk(request, progress).await?;
//! ```

mod http;
mod mock;
mod retry;

pub use http::{HttpTransport, DEFAULT_TIMEOUT, UPLOAD_SLICE_SIZE};
pub use mock::{MockReply, MockTransport};
pub use retry::{RetryingTransport, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use xfer_types::{Acknowledgment, ChunkDescriptor, ErrorKind, FileId, SessionMetadata, WireError};

/// Byte-progress callback for one chunk: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A progress callback that discards updates.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _| {})
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection or I/O failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the per-request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The endpoint answered with something that is not a valid acknowledgment.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl TransportError {
    /// Error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Status { .. } => ErrorKind::Network,
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
        }
    }

    /// Whether resubmitting the same chunk may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<WireError> for TransportError {
    fn from(e: WireError) -> Self {
        Self::ProtocolViolation(e.to_string())
    }
}

/// One chunk submission.
#[derive(Clone)]
pub struct ChunkRequest {
    /// Position of the chunk in the file.
    pub descriptor: ChunkDescriptor,
    /// Plaintext size of the whole file.
    pub file_size: u64,
    /// Name attached to the binary part.
    pub file_name: String,
    /// Sealed chunk bytes.
    pub payload: Bytes,
    /// Server-assigned id; `None` only on the first chunk.
    pub file_id: Option<FileId>,
    /// Session metadata; only sent with the first chunk.
    pub metadata: Option<SessionMetadata>,
}

impl ChunkRequest {
    /// 1-based chunk index.
    pub fn index(&self) -> u32 {
        self.descriptor.index
    }
}

impl std::fmt::Debug for ChunkRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkRequest")
            .field("descriptor", &self.descriptor)
            .field("file_size", &self.file_size)
            .field("file_name", &self.file_name)
            .field("payload", &format!("[{} bytes]", self.payload.len()))
            .field("file_id", &self.file_id)
            .field("metadata", &self.metadata.as_ref().map(|m| m.len()))
            .finish()
    }
}

/// Submits sealed chunks to the endpoint.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Submit one chunk and wait for the endpoint's acknowledgment.
    ///
    /// `progress` is called as payload bytes are handed to the network.
    async fn submit_chunk(
        &self,
        request: ChunkRequest,
        progress: ProgressFn,
    ) -> Result<Acknowledgment, TransportError>;
}

#[async_trait]
impl<T: ChunkTransport + ?Sized> ChunkTransport for Arc<T> {
    async fn submit_chunk(
        &self,
        request: ChunkRequest,
        progress: ProgressFn,
    ) -> Result<Acknowledgment, TransportError> {
        (**self).submit_chunk(request, progress).await
    }
}
