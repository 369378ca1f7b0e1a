//! # xfer-client
//!
//! Chunked, client-side encrypted uploads for pwx-xfer.
//!
//! Applications hand a [`ChunkSource`] and a [`ChunkTransport`] to an
//! [`UploadSession`]; the session plans the chunks, seals each one under a
//! fresh session key, and submits them in the order the endpoint expects.
//!
//! ## Features
//!
//! - **E2E Encryption**: every chunk sealed with XChaCha20-Poly1305 before it leaves the process
//! - **Bounded Concurrency**: interior chunks submitted in parallel, capped by `max_concurrency`
//! - **Transport Abstraction**: HTTP (reqwest), retry wrapper, mock for tests
//! - **Pure State Machine**: ordering rules live in xfer-core, free of I/O
//!
//! ## Example
//!
//! ```ignore
//! use pwx_xfer_client::{HttpTransport, MemorySource, UploadConfig, UploadSession};
//! use tokio_util::sync::CancellationToken;
//!
//! let transport = HttpTransport::new("https://password.exchange/upload")?;
//! let mut session = UploadSession::new(MemorySource::new(data), transport, UploadConfig::default());
//!
//! let outcome = session.run(CancellationToken::new()).await?;
//! println!("share: {}", outcome.share_url());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod source;
pub mod transport;
pub mod uploader;

pub use source::{ChunkSource, FileSource, MemorySource};
pub use transport::{
    no_progress, ChunkRequest, ChunkTransport, HttpTransport, MockReply, MockTransport,
    ProgressFn, RetryingTransport, TransportError,
};
pub use uploader::{
    UploadConfig, UploadError, UploadOutcome, UploadSession, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_CONCURRENCY, MAX_CONCURRENCY_LIMIT,
};
