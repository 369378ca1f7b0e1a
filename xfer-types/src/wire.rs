//! Wire types for the submit-chunk endpoint.
//!
//! Every chunk travels as one multipart POST. The first request carries the
//! session metadata; every later request carries the `fileID` assigned by the
//! server instead. The endpoint answers with a small JSON acknowledgment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{FileId, WireError};

/// MIME type of the sealed `file` part.
pub const SEAL_CONTENT_TYPE: &str = "application/octet-stream";

/// Canonical multipart field and JSON key names.
pub mod fields {
    /// Binary sealed-chunk part.
    pub const FILE: &str = "file";
    /// Server-assigned file identifier (request field and ack key).
    pub const FILE_ID: &str = "fileID";
    /// 1-based index of the chunk in this request.
    pub const CURRENT_CHUNK: &str = "currentChunk";
    /// Total number of chunks in the upload.
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    /// Retrieval link, present on the final acknowledgment only.
    pub const URL: &str = "URL";

    /// Names that session metadata may not shadow.
    pub const RESERVED: [&str; 5] = [FILE, FILE_ID, CURRENT_CHUNK, TOTAL_CHUNKS, URL];
}

/// One planned chunk of the source file.
///
/// `start..end` is a half-open byte range of the plaintext file. Descriptors
/// are produced by the chunk planner and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    /// 1-based position of the chunk.
    pub index: u32,
    /// First byte of the range (inclusive).
    pub start: u64,
    /// End of the range (exclusive).
    pub end: u64,
    /// Number of chunks in the whole upload.
    pub total_chunks: u32,
}

impl ChunkDescriptor {
    /// Plaintext length of this chunk.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True only for a zero-length range, which the planner never produces.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The chunk that establishes the session.
    pub fn is_first(&self) -> bool {
        self.index == 1
    }

    /// The chunk whose acknowledgment carries the retrieval URL.
    pub fn is_last(&self) -> bool {
        self.index == self.total_chunks
    }

    /// Neither first nor last; may be submitted concurrently.
    pub fn is_interior(&self) -> bool {
        !self.is_first() && !self.is_last()
    }

    /// The `Content-Range` header describing this chunk within `file_size`.
    pub fn content_range(&self, file_size: u64) -> ContentRange {
        ContentRange {
            start: self.start,
            end: self.end,
            total: file_size,
        }
    }
}

/// `Content-Range: bytes <first>-<last>/<total>` for one chunk.
///
/// Stored half-open like [`ChunkDescriptor`]; rendered with an inclusive
/// last byte as HTTP requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte (inclusive).
    pub start: u64,
    /// End of range (exclusive).
    pub end: u64,
    /// Size of the whole plaintext file.
    pub total: u64,
}

impl ContentRange {
    /// Parse a header value such as `bytes 0-5242879/12582912`.
    pub fn parse(value: &str) -> Result<Self, WireError> {
        let invalid = |reason: &str| WireError::InvalidField {
            field: "Content-Range",
            reason: format!("{reason}: {value:?}"),
        };

        let spec = value
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| invalid("missing bytes unit"))?;
        let (range, total) = spec.split_once('/').ok_or_else(|| invalid("missing total"))?;
        let (first, last) = range.split_once('-').ok_or_else(|| invalid("missing range"))?;

        let parse_u64 = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid("not a number"));
        let start = parse_u64(first)?;
        let last = parse_u64(last)?;
        let total = parse_u64(total)?;

        if last < start || last >= total {
            return Err(invalid("range out of bounds"));
        }

        Ok(Self {
            start,
            end: last + 1,
            total,
        })
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes {}-{}/{}",
            self.start,
            self.end.saturating_sub(1),
            self.total
        )
    }
}

/// The submit-chunk endpoint's response.
///
/// `file_id` is expected on every acknowledgment; `url` only on the final
/// one. Blank strings are normalized to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Identifier correlating the chunks of this upload.
    #[serde(rename = "fileID", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    /// Retrieval link, set once the upload is complete.
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Acknowledgment {
    /// Acknowledgment for a non-final chunk.
    pub fn interim(file_id: FileId) -> Self {
        Self {
            file_id: Some(file_id),
            url: None,
        }
    }

    /// Acknowledgment for the final chunk.
    pub fn complete(file_id: FileId, url: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id),
            url: Some(url.into()),
        }
    }

    /// Decode a response body.
    pub fn from_json(body: &[u8]) -> Result<Self, WireError> {
        let ack: Self = serde_json::from_slice(body).map_err(WireError::MalformedAck)?;
        Ok(Self {
            file_id: ack.file_id.and_then(|id| FileId::new(id.as_str())),
            url: ack.url.filter(|u| !u.trim().is_empty()),
        })
    }

    /// Encode as the endpoint would.
    pub fn to_json(&self) -> String {
        // Two optional strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Opaque form fields identifying the logical upload.
///
/// Sent with the first chunk only (sender and recipient names, e-mail
/// addresses, the accompanying message). Insertion order is preserved so the
/// multipart body is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    entries: Vec<(String, String)>,
}

impl SessionMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs, rejecting reserved protocol names.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, WireError>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.insert(key, value)?;
        }
        Ok(metadata)
    }

    /// Set a field, replacing an earlier value with the same name.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), WireError> {
        let key = key.into();
        if key.is_empty() || fields::RESERVED.contains(&key.as_str()) {
            return Err(WireError::InvalidField {
                field: "metadata",
                reason: format!("{key:?} is not an allowed field name"),
            });
        }

        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no fields are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
