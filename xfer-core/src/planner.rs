//! Chunk planning.
//!
//! Splits a file of known size into ordered, size-bounded byte ranges.
//! The plan is a pure value: it can be recomputed at any time from
//! `(file_size, chunk_size)` and iterated as often as needed.

use thiserror::Error;
use xfer_types::{ChunkDescriptor, ErrorKind};

/// Errors produced while planning an upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Chunk size must be at least one byte.
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// The chunk count does not fit the 32-bit wire index.
    #[error("file of {file_size} bytes needs more than {max} chunks of {chunk_size} bytes", max = u32::MAX)]
    TooManyChunks {
        /// Size of the file being planned.
        file_size: u64,
        /// Requested chunk size.
        chunk_size: u64,
    },
}

impl PlanError {
    /// Error classification.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Planning
    }
}

/// An upload plan: `ceil(file_size / chunk_size)` contiguous ranges.
///
/// Ranges are 1-based, contiguous, non-overlapping and cover exactly
/// `[0, file_size)`. The last range holds the remainder; no range is ever
/// zero-length, so an empty file has an empty plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Plan `file_size` bytes in chunks of at most `chunk_size` bytes.
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, PlanError> {
        if chunk_size == 0 {
            return Err(PlanError::ZeroChunkSize);
        }

        let count = file_size.div_ceil(chunk_size);
        let total_chunks = u32::try_from(count).map_err(|_| PlanError::TooManyChunks {
            file_size,
            chunk_size,
        })?;

        Ok(Self {
            file_size,
            chunk_size,
            total_chunks,
        })
    }

    /// Size of the planned file.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Maximum size of each chunk.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks.
    pub fn len(&self) -> u32 {
        self.total_chunks
    }

    /// True for a zero-length file.
    pub fn is_empty(&self) -> bool {
        self.total_chunks == 0
    }

    /// Descriptor for a 1-based chunk index.
    pub fn get(&self, index: u32) -> Option<ChunkDescriptor> {
        if index == 0 || index > self.total_chunks {
            return None;
        }

        let start = u64::from(index - 1) * self.chunk_size;
        let end = start.saturating_add(self.chunk_size).min(self.file_size);
        Some(ChunkDescriptor {
            index,
            start,
            end,
            total_chunks: self.total_chunks,
        })
    }

    /// The session-establishing chunk.
    pub fn first(&self) -> Option<ChunkDescriptor> {
        self.get(1)
    }

    /// The completing chunk.
    pub fn last(&self) -> Option<ChunkDescriptor> {
        self.get(self.total_chunks)
    }

    /// All chunks in order.
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 1,
            last: u64::from(self.total_chunks),
        }
    }

    /// Chunks `2..N-1`, the ones that may be in flight together.
    pub fn interior(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 2,
            last: u64::from(self.total_chunks.saturating_sub(1)),
        }
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = ChunkDescriptor;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

/// Lazy iterator over a contiguous run of a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: u64,
    last: u64,
}

impl Iterator for ChunkIter {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<ChunkDescriptor> {
        if self.next > self.last {
            return None;
        }
        let descriptor = u32::try_from(self.next).ok().and_then(|i| self.plan.get(i));
        self.next += 1;
        descriptor
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last + 1).saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter {}
