//! UploadSession - drives one chunked, encrypted upload.
//!
//! The session owns everything about a single upload: the plan, the session
//! key, the state machine, and the progress tracker. There is no shared
//! state between sessions.
//!
//! # Architecture
//!
//! ```text
//! ChunkSource → seal (xfer-seal) → ChunkTransport → endpoint
//!                        ↑
//!        UploadState (xfer-core, pure state machine)
//! ```
//!
//! Ordering follows the endpoint's protocol: the first chunk is submitted
//! alone and its acknowledgment supplies the file id; interior chunks are
//! then submitted concurrently (at most `max_concurrency` at a time); the
//! final chunk goes last, once every interior chunk is acknowledged, and its
//! acknowledgment carries the retrieval URL.
//!
//! # Example
//!
//! ```ignore
//! use pwx_xfer_client::{FileSource, HttpTransport, UploadConfig, UploadSession};
//! use tokio_util::sync::CancellationToken;
//!
//! let source = FileSource::open("report.pdf").await?;
//! let transport = HttpTransport::new("https://password.exchange/upload")?;
//! let mut session = UploadSession::new(source, transport, UploadConfig::default());
//!
//! let outcome = session.run(CancellationToken::new()).await?;
//! println!("{}", outcome.share_url());
//! ```

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xfer_core::{Action, ChunkPlan, Event, Phase, PlanError, ProgressTracker, UploadState};
use xfer_seal::{ChunkCipher, SealError, SessionKey, MAX_CHUNK_SIZE};
use xfer_types::{Acknowledgment, ErrorKind, FileId, SessionMetadata};

use crate::source::ChunkSource;
use crate::transport::{ChunkRequest, ChunkTransport, ProgressFn, TransportError};

/// Default plaintext chunk size (5 MB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of interior chunks in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Upper bound on `max_concurrency`.
pub const MAX_CONCURRENCY_LIMIT: usize = 64;

/// Upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Source has no bytes; nothing was sent.
    #[error("source is empty; nothing to upload")]
    EmptySource,

    /// Configuration rejected before any I/O.
    #[error("invalid upload configuration: {0}")]
    InvalidConfig(String),

    /// Chunk layout could not be planned.
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    /// Session key could not be generated.
    #[error("failed to generate session key: {0}")]
    KeyGeneration(#[source] SealError),

    /// Reading a chunk from the source failed.
    #[error("failed to read chunk {index}: {source}")]
    Read {
        /// 1-based chunk index.
        index: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Sealing a chunk failed.
    #[error("failed to seal chunk {index}: {source}")]
    Seal {
        /// 1-based chunk index.
        index: u32,
        /// Underlying seal error.
        #[source]
        source: SealError,
    },

    /// Submitting a chunk failed.
    #[error("chunk {index} failed: {source}")]
    Transport {
        /// 1-based chunk index.
        index: u32,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The endpoint's acknowledgments broke the upload protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The caller cancelled the upload.
    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptySource | Self::InvalidConfig(_) => ErrorKind::Planning,
            Self::Plan(e) => e.kind(),
            Self::KeyGeneration(e) => e.kind(),
            Self::Read { .. } => ErrorKind::Io,
            Self::Seal { source, .. } => source.kind(),
            Self::Transport { source, .. } => source.kind(),
            Self::Protocol(_) => ErrorKind::ProtocolViolation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Index of the chunk that failed, if the failure belongs to one.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            Self::Read { index, .. } | Self::Seal { index, .. } | Self::Transport { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

/// Configuration for UploadSession.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Plaintext bytes per chunk.
    pub chunk_size: u64,
    /// Interior chunks in flight at once (1..=64).
    pub max_concurrency: usize,
    /// Name attached to every chunk's binary part.
    pub file_name: String,
    /// Form fields sent with the first chunk.
    pub metadata: SessionMetadata,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            file_name: "blob".to_string(),
            metadata: SessionMetadata::new(),
        }
    }
}

impl UploadConfig {
    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the interior concurrency bound.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the multipart file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Set the first-chunk metadata.
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn validate(&self) -> Result<(), UploadError> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            return Err(UploadError::InvalidConfig(format!(
                "max_concurrency must be between 1 and {MAX_CONCURRENCY_LIMIT}, got {}",
                self.max_concurrency
            )));
        }
        if self.chunk_size > MAX_CHUNK_SIZE as u64 {
            return Err(UploadError::InvalidConfig(format!(
                "chunk_size {} exceeds maximum of {MAX_CHUNK_SIZE} bytes",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Server-assigned identifier.
    pub file_id: FileId,
    /// Retrieval URL from the final acknowledgment.
    pub url: String,
    /// Key that sealed every chunk.
    pub key: SessionKey,
    /// Phases the session went through, in order.
    pub phases: Vec<Phase>,
}

impl UploadOutcome {
    /// Retrieval URL with the key in its fragment.
    pub fn share_url(&self) -> String {
        self.key.share_url(&self.url)
    }
}

/// Wraps the pure state machine and records each phase change.
struct Machine {
    state: UploadState,
    phases: Vec<Phase>,
}

impl Machine {
    fn new() -> Self {
        let state = UploadState::new();
        Self {
            phases: vec![state.phase()],
            state,
        }
    }

    fn apply(&mut self, event: Event) -> Vec<Action> {
        let before = self.state.phase();
        let (next, actions) = std::mem::take(&mut self.state).on_event(event);
        if next.phase() != before {
            self.phases.push(next.phase());
        }
        self.state = next;
        actions
    }
}

/// The main upload driver.
///
/// Manages one upload from planning to the final acknowledgment.
pub struct UploadSession<S, T> {
    source: S,
    transport: T,
    config: UploadConfig,
    key: Option<SessionKey>,
    progress_tx: Arc<watch::Sender<f64>>,
    phases: Vec<Phase>,
}

impl<S: ChunkSource, T: ChunkTransport> UploadSession<S, T> {
    /// Create a new UploadSession.
    pub fn new(source: S, transport: T, config: UploadConfig) -> Self {
        let (progress_tx, _) = watch::channel(0.0);
        Self {
            source,
            transport,
            config,
            key: None,
            progress_tx: Arc::new(progress_tx),
            phases: Vec::new(),
        }
    }

    /// Seal with the given key instead of generating a fresh one.
    pub fn with_key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Subscribe to progress updates (fraction in `0.0..=1.0`).
    ///
    /// Each run starts again from `0.0`; within a run the fraction never
    /// decreases.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress_tx.subscribe()
    }

    /// Phases of the most recent run, in order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run the upload to completion, failure, or cancellation.
    ///
    /// Exactly one terminal result is produced. After the first failure no
    /// further chunks are dispatched and in-flight submissions are dropped.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<UploadOutcome, UploadError> {
        self.progress_tx.send_replace(0.0);
        let mut machine = Machine::new();
        let result = self.drive(&cancel, &mut machine).await;
        self.phases = machine.phases;

        match &result {
            Ok(outcome) => info!(
                file_id = %outcome.file_id,
                bytes = self.source.len(),
                "Upload complete"
            ),
            Err(e) => warn!(error = %e, kind = %e.kind(), "Upload failed"),
        }
        result.map(|mut outcome| {
            outcome.phases = self.phases.clone();
            outcome
        })
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        machine: &mut Machine,
    ) -> Result<UploadOutcome, UploadError> {
        let file_size = self.source.len();
        if file_size == 0 {
            machine.apply(Event::Start { total_chunks: 0 });
            return Err(UploadError::EmptySource);
        }
        self.config.validate()?;
        let plan = ChunkPlan::new(file_size, self.config.chunk_size)?;

        let key = match &self.key {
            Some(key) => key.clone(),
            None => SessionKey::generate().map_err(UploadError::KeyGeneration)?,
        };
        let cipher = ChunkCipher::new(&key);
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(plan.len())));

        info!(
            file_size,
            total_chunks = plan.len(),
            chunk_size = self.config.chunk_size,
            max_concurrency = self.config.max_concurrency,
            "Starting upload"
        );

        let chunk = ChunkContext {
            source: &self.source,
            transport: &self.transport,
            config: &self.config,
            plan: &plan,
            cipher: &cipher,
            tracker: &tracker,
            progress_tx: &self.progress_tx,
        };

        // The first error observed; the state machine only keeps its kind.
        let mut failure: Option<UploadError> = None;
        let mut actions = machine.apply(Event::Start {
            total_chunks: plan.len(),
        });

        loop {
            let mut events = Vec::new();
            let mut interior = Vec::new();

            for action in actions {
                match action {
                    Action::Submit { index, file_id }
                        if plan.get(index).is_some_and(|d| d.is_interior()) =>
                    {
                        interior.push((index, file_id));
                    }
                    Action::Submit { index, file_id } => {
                        // First and final chunks never overlap another submission
                        let event = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Event::Cancel,
                            (index, result) = chunk.submit(index, file_id) => {
                                chunk.record(index, result, &mut failure)
                            }
                        };
                        events.push(event);
                    }
                    Action::Dispatch => events.push(Event::Dispatched),
                    Action::Finish { file_id, url } => {
                        return Ok(UploadOutcome {
                            file_id,
                            url,
                            key,
                            phases: Vec::new(),
                        });
                    }
                    Action::Abort { kind, reason } => {
                        return Err(failure.take().unwrap_or_else(|| abort_error(kind, reason)));
                    }
                }
            }

            if !interior.is_empty() {
                debug!(
                    count = interior.len(),
                    max_concurrency = self.config.max_concurrency,
                    "Dispatching interior chunks"
                );
                let mut in_flight = stream::iter(interior)
                    .map(|(index, file_id)| chunk.submit(index, file_id))
                    .buffer_unordered(self.config.max_concurrency);

                let mut follow_up = Vec::new();
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Event::Cancel,
                        next = in_flight.next() => match next {
                            Some((index, result)) => chunk.record(index, result, &mut failure),
                            None => break,
                        },
                    };
                    let produced = machine.apply(event);
                    let aborted = produced.iter().any(|a| matches!(a, Action::Abort { .. }));
                    follow_up.extend(produced);
                    if aborted {
                        // Dropping the stream drops every in-flight submission
                        break;
                    }
                }
                actions = follow_up;
            } else {
                actions = Vec::new();
            }

            for event in events {
                actions.extend(machine.apply(event));
            }

            if actions.is_empty() {
                // No work left and no terminal action: the endpoint never
                // completed the protocol.
                let reason = "upload stalled without a terminal acknowledgment".to_string();
                machine.apply(Event::ChunkFailed {
                    index: plan.len(),
                    kind: ErrorKind::ProtocolViolation,
                    reason: reason.clone(),
                });
                return Err(failure.take().unwrap_or(UploadError::Protocol(reason)));
            }
        }
    }
}

fn abort_error(kind: ErrorKind, reason: String) -> UploadError {
    match kind {
        ErrorKind::Cancelled => UploadError::Cancelled,
        ErrorKind::Planning => UploadError::InvalidConfig(reason),
        _ => UploadError::Protocol(reason),
    }
}

/// Borrowed view of everything a single chunk submission needs.
struct ChunkContext<'a, S, T> {
    source: &'a S,
    transport: &'a T,
    config: &'a UploadConfig,
    plan: &'a ChunkPlan,
    cipher: &'a ChunkCipher,
    tracker: &'a Arc<Mutex<ProgressTracker>>,
    progress_tx: &'a Arc<watch::Sender<f64>>,
}

impl<S: ChunkSource, T: ChunkTransport> ChunkContext<'_, S, T> {
    /// Read, seal, and submit one chunk.
    async fn submit(
        &self,
        index: u32,
        file_id: Option<FileId>,
    ) -> (u32, Result<Acknowledgment, UploadError>) {
        (index, self.try_submit(index, file_id).await)
    }

    async fn try_submit(
        &self,
        index: u32,
        file_id: Option<FileId>,
    ) -> Result<Acknowledgment, UploadError> {
        let descriptor = self.plan.get(index).ok_or_else(|| {
            UploadError::Protocol(format!("chunk {index} is outside the plan"))
        })?;

        let plaintext = self
            .source
            .read_range(descriptor.start, descriptor.end)
            .await
            .map_err(|source| UploadError::Read { index, source })?;
        let sealed = self
            .cipher
            .seal(&plaintext, index, descriptor.total_chunks)
            .map_err(|source| UploadError::Seal { index, source })?;

        let metadata = file_id.is_none().then(|| self.config.metadata.clone());
        let request = ChunkRequest {
            descriptor,
            file_size: self.plan.file_size(),
            file_name: self.config.file_name.clone(),
            payload: Bytes::from(sealed),
            file_id,
            metadata,
        };

        debug!(
            index,
            total_chunks = descriptor.total_chunks,
            bytes = request.payload.len(),
            "Submitting chunk"
        );

        self.transport
            .submit_chunk(request, self.progress_fn(index))
            .await
            .map_err(|source| UploadError::Transport { index, source })
    }

    fn progress_fn(&self, index: u32) -> ProgressFn {
        let tracker = Arc::clone(self.tracker);
        let tx = Arc::clone(self.progress_tx);
        Arc::new(move |sent, total| {
            if let Ok(mut tracker) = tracker.lock() {
                tx.send_replace(tracker.on_bytes_sent(index, sent, total));
            }
        })
    }

    /// Turn a submission result into a state machine event, updating progress.
    fn record(
        &self,
        index: u32,
        result: Result<Acknowledgment, UploadError>,
        failure: &mut Option<UploadError>,
    ) -> Event {
        match result {
            Ok(ack) => {
                if let Ok(mut tracker) = self.tracker.lock() {
                    if tracker.on_acked(index) {
                        self.progress_tx.send_replace(tracker.fraction());
                    }
                }
                debug!(index, "Chunk acknowledged");
                Event::Acked { index, ack }
            }
            Err(e) => {
                if let Ok(mut tracker) = self.tracker.lock() {
                    tracker.on_failed(index);
                }
                let event = Event::ChunkFailed {
                    index,
                    kind: e.kind(),
                    reason: e.to_string(),
                };
                failure.get_or_insert(e);
                event
            }
        }
    }
}
