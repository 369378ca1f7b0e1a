//! Random-access sources of plaintext.
//!
//! The upload driver reads each chunk's byte range on demand, so only the
//! chunks currently in flight are held in memory. Concurrent interior
//! chunks read their ranges independently.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Trait for a fixed-size plaintext source.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Total size in bytes.
    fn len(&self) -> u64;

    /// Whether the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the half-open range `start..end`.
    ///
    /// Fails with `UnexpectedEof` if the range runs past the end.
    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>>;
}

/// In-memory source, for tests and small payloads.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    /// Wrap a buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        let out_of_range = || {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("range {start}..{end} outside source of {} bytes", self.data.len()),
            )
        };
        let start = usize::try_from(start).map_err(|_| out_of_range())?;
        let end = usize::try_from(end).map_err(|_| out_of_range())?;
        self.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(out_of_range)
    }
}

/// File on disk. Each read opens its own handle so concurrent reads do not
/// share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Open a file and record its current size.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, len })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, for the multipart file name.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        let len = usize::try_from(end.saturating_sub(start)).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "range too large")
        })?;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
