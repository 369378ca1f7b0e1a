//! HTTP transport: one multipart POST per chunk.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_RANGE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use xfer_types::{fields, Acknowledgment, SEAL_CONTENT_TYPE};

use super::{ChunkRequest, ChunkTransport, ProgressFn, TransportError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Payload slice size for byte-progress reporting (64 KB).
pub const UPLOAD_SLICE_SIZE: usize = 64 * 1024;

/// Error bodies longer than this are cut before landing in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Submits chunks to the submit-chunk endpoint with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Use an existing client (shared connection pool, custom TLS).
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(request: ChunkRequest, progress: ProgressFn) -> Result<Form, TransportError> {
        let length = request.payload.len() as u64;
        let part = Part::stream_with_length(progress_body(request.payload, progress), length)
            .file_name(request.file_name)
            .mime_str(SEAL_CONTENT_TYPE)
            .map_err(|e| TransportError::Network(format!("invalid part content type: {e}")))?;

        let mut form = Form::new()
            .text(fields::CURRENT_CHUNK, request.descriptor.index.to_string())
            .text(fields::TOTAL_CHUNKS, request.descriptor.total_chunks.to_string());

        match (request.file_id, request.metadata) {
            (Some(file_id), _) => {
                form = form.text(fields::FILE_ID, file_id.as_str().to_string());
            }
            (None, Some(metadata)) => {
                for (name, value) in metadata.iter() {
                    form = form.text(name.to_string(), value.to_string());
                }
            }
            (None, None) => {}
        }

        Ok(form.part(fields::FILE, part))
    }
}

/// Wrap the payload in a streaming body that reports progress per slice.
fn progress_body(payload: Bytes, progress: ProgressFn) -> Body {
    Body::wrap_stream(progress_stream(payload, progress))
}

/// Split the payload into slices, reporting cumulative bytes as each slice
/// is handed to the connection.
fn progress_stream(
    payload: Bytes,
    progress: ProgressFn,
) -> impl futures_util::stream::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = payload.len() as u64;
    let slices: Vec<Bytes> = (0..payload.len())
        .step_by(UPLOAD_SLICE_SIZE)
        .map(|start| payload.slice(start..(start + UPLOAD_SLICE_SIZE).min(payload.len())))
        .collect();

    let mut sent = 0u64;
    futures_util::stream::iter(slices.into_iter().map(move |slice| {
        sent += slice.len() as u64;
        progress(sent, total);
        Ok(slice)
    }))
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn submit_chunk(
        &self,
        request: ChunkRequest,
        progress: ProgressFn,
    ) -> Result<Acknowledgment, TransportError> {
        let range = request.descriptor.content_range(request.file_size);
        let index = request.descriptor.index;
        let form = Self::build_form(request, progress)?;

        let send = async {
            let response = self
                .client
                .post(&self.endpoint)
                .header(CONTENT_RANGE, range.to_string())
                .multipart(form)
                .send()
                .await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| map_reqwest_error(e, self.timeout))?;

        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            tracing::debug!(index, status = status.as_u16(), "chunk rejected by endpoint");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Acknowledgment::from_json(&body)?)
    }
}
