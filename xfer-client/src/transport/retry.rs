//! Retry wrapper around any [`ChunkTransport`].

use std::time::Duration;

use async_trait::async_trait;
use xfer_core::retry_delay;
use xfer_types::Acknowledgment;

use super::{ChunkRequest, ChunkTransport, ProgressFn, TransportError};

/// Default base delay between retries.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on a single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Resubmits chunks that failed with a retryable error.
///
/// Network errors, timeouts and non-success statuses are retried up to
/// `max_retries` times with exponential backoff. Protocol violations are
/// returned immediately: the server answered, and resending would not
/// change its answer.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: ChunkTransport> RetryingTransport<T> {
    /// Wrap `inner`, allowing up to `max_retries` resubmissions per chunk.
    pub fn new(inner: T, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Override the backoff delays.
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: ChunkTransport> ChunkTransport for RetryingTransport<T> {
    async fn submit_chunk(
        &self,
        request: ChunkRequest,
        progress: ProgressFn,
    ) -> Result<Acknowledgment, TransportError> {
        let mut attempt = 0u32;
        loop {
            match self
                .inner
                .submit_chunk(request.clone(), progress.clone())
                .await
            {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt, self.base_delay, self.max_delay);
                    tracing::warn!(
                        index = request.index(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chunk submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
