//! Mock transport for testing.
//!
//! Acknowledges every chunk the way a well-behaved endpoint would, unless
//! told otherwise. Replies can be scripted per chunk, failures injected,
//! and responses delayed; every submitted request is recorded along with
//! the peak number of concurrent submissions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use xfer_types::{Acknowledgment, FileId};

use super::{ChunkRequest, ChunkTransport, ProgressFn, TransportError};

/// A scripted reply for one submission.
#[derive(Debug)]
pub enum MockReply {
    /// Answer with this acknowledgment.
    Ack(Acknowledgment),
    /// Fail with this error.
    Fail(TransportError),
}

/// Mock transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    file_id: String,
    retrieval_url: String,
    replies: HashMap<u32, VecDeque<MockReply>>,
    fail_next: VecDeque<TransportError>,
    delays: HashMap<u32, Duration>,
    default_delay: Duration,
    submitted: Vec<ChunkRequest>,
    completed: Vec<u32>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock that acknowledges everything with `mock-file-id`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                file_id: "mock-file-id".to_string(),
                retrieval_url: "https://pwx.invalid/d/mock-file-id".to_string(),
                replies: HashMap::new(),
                fail_next: VecDeque::new(),
                delays: HashMap::new(),
                default_delay: Duration::ZERO,
                submitted: Vec::new(),
                completed: Vec::new(),
                in_flight: 0,
                peak_in_flight: 0,
            })),
        }
    }

    /// Set the file id returned by default acknowledgments.
    ///
    /// A blank id makes default acknowledgments omit `fileID`.
    pub fn with_file_id(self, file_id: &str) -> Self {
        self.inner.lock().unwrap().file_id = file_id.to_string();
        self
    }

    /// Set the retrieval URL returned with the final acknowledgment.
    pub fn with_retrieval_url(self, url: &str) -> Self {
        self.inner.lock().unwrap().retrieval_url = url.to_string();
        self
    }

    /// Queue a reply for the next submission of chunk `index`.
    pub fn script(&self, index: u32, reply: MockReply) {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.entry(index).or_default().push_back(reply);
    }

    /// Cause the next submission (of any chunk) to fail with `error`.
    ///
    /// Multiple calls queue failures for consecutive submissions.
    pub fn fail_next_submit(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next.push_back(error);
    }

    /// Delay the response to chunk `index`.
    pub fn delay(&self, index: u32, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.delays.insert(index, delay);
    }

    /// Delay every response without a per-chunk delay.
    pub fn delay_all(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.default_delay = delay;
    }

    /// All requests in submission order.
    pub fn submitted(&self) -> Vec<ChunkRequest> {
        let inner = self.inner.lock().unwrap();
        inner.submitted.clone()
    }

    /// Chunk indices in submission order.
    pub fn submitted_indices(&self) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        inner.submitted.iter().map(|r| r.index()).collect()
    }

    /// Chunk indices in the order their acknowledgments were returned.
    pub fn completed_indices(&self) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        inner.completed.clone()
    }

    /// Highest number of submissions that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.peak_in_flight
    }

    /// Clear recorded requests and scripted behavior.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.clear();
        inner.fail_next.clear();
        inner.delays.clear();
        inner.default_delay = Duration::ZERO;
        inner.submitted.clear();
        inner.completed.clear();
        inner.peak_in_flight = inner.in_flight;
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Decrements the in-flight counter even when the submission is dropped.
struct InFlightGuard(Arc<Mutex<MockTransportInner>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.0.lock() {
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
    }
}

#[async_trait]
impl ChunkTransport for MockTransport {
    async fn submit_chunk(
        &self,
        request: ChunkRequest,
        progress: ProgressFn,
    ) -> Result<Acknowledgment, TransportError> {
        let index = request.index();
        let is_last = request.descriptor.is_last();
        let len = request.payload.len() as u64;

        let (delay, reply, default_ack) = {
            let mut inner = self.inner.lock().unwrap();
            inner.submitted.push(request);
            inner.in_flight += 1;
            inner.peak_in_flight = inner.peak_in_flight.max(inner.in_flight);

            let delay = inner
                .delays
                .get(&index)
                .copied()
                .unwrap_or(inner.default_delay);
            let reply = match inner.fail_next.pop_front() {
                Some(error) => Some(MockReply::Fail(error)),
                None => inner.replies.get_mut(&index).and_then(|q| q.pop_front()),
            };
            let default_ack = Acknowledgment {
                file_id: FileId::new(inner.file_id.as_str()),
                url: is_last.then(|| inner.retrieval_url.clone()),
            };
            (delay, reply, default_ack)
        };
        let _guard = InFlightGuard(Arc::clone(&self.inner));

        progress(len / 2, len);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match reply {
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Ack(ack)) => Ok(ack),
            None => Ok(default_ack),
        };

        if result.is_ok() {
            progress(len, len);
            self.inner.lock().unwrap().completed.push(index);
        }
        result
    }
}
