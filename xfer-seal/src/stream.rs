//! Whole-file sealing and ordered, fail-closed opening.
//!
//! A sealed file is the concatenation of its sealed chunks in index order.
//! Each sealed chunk is `SEAL_OVERHEAD` bytes larger than its plaintext, so
//! the reader recovers chunk boundaries from the plaintext chunk size alone.
//!
//! Opening never releases plaintext from a chunk that has not verified, and
//! stops at the first failure: once a chunk fails, nothing after it is
//! produced.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use xfer_core::{ChunkPlan, PlanError};

use crate::cipher::{ChunkCipher, MAX_CHUNK_SIZE, SEAL_OVERHEAD};
use crate::error::SealError;
use crate::key::SessionKey;

/// Size of the sealed form of a file of `plain_len` bytes.
pub fn sealed_len(plain_len: u64, chunk_size: u64) -> Result<u64, PlanError> {
    let plan = ChunkPlan::new(plain_len, chunk_size)?;
    Ok(plain_len + u64::from(plan.len()) * SEAL_OVERHEAD as u64)
}

fn check_chunk_size(chunk_size: u64) -> Result<(), SealError> {
    if chunk_size == 0 {
        return Err(PlanError::ZeroChunkSize.into());
    }
    if chunk_size > MAX_CHUNK_SIZE as u64 {
        return Err(SealError::ChunkTooLarge {
            chunk_size,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

/// Sequential opener for the chunks of one sealed stream.
///
/// Chunks must be pushed in index order. After the first failure the opener
/// is poisoned and rejects everything that follows.
#[derive(Debug)]
pub struct ChunkOpener {
    cipher: ChunkCipher,
    total_chunks: u32,
    next_index: u32,
    poisoned: bool,
}

impl ChunkOpener {
    /// Create an opener for a stream of `total_chunks` chunks.
    pub fn new(key: &SessionKey, total_chunks: u32) -> Self {
        Self {
            cipher: ChunkCipher::new(key),
            total_chunks,
            next_index: 1,
            poisoned: false,
        }
    }

    /// Index the next pushed chunk is expected to have.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Open the next chunk in sequence.
    pub fn open_next(&mut self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if self.poisoned || self.next_index > self.total_chunks {
            self.poisoned = true;
            return Err(SealError::AuthenticationFailed);
        }

        match self.cipher.open(sealed, self.next_index, self.total_chunks) {
            Ok(plaintext) => {
                self.next_index += 1;
                Ok(plaintext)
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Confirm every expected chunk was opened.
    pub fn finish(self) -> Result<(), SealError> {
        if self.poisoned || self.next_index != self.total_chunks.saturating_add(1) {
            return Err(SealError::AuthenticationFailed);
        }
        Ok(())
    }
}

/// Open a list of sealed chunks held in memory.
///
/// `totalChunks` is taken from the list itself. Returns the concatenated
/// plaintext only if every chunk verifies.
pub fn open_chunks<B: AsRef<[u8]>>(key: &SessionKey, sealed: &[B]) -> Result<Vec<u8>, SealError> {
    let total = u32::try_from(sealed.len()).map_err(|_| PlanError::TooManyChunks {
        file_size: sealed.len() as u64,
        chunk_size: 1,
    })?;

    let mut opener = ChunkOpener::new(key, total);
    let mut plaintext = Vec::new();
    for chunk in sealed {
        plaintext.extend_from_slice(&opener.open_next(chunk.as_ref())?);
    }
    opener.finish()?;
    Ok(plaintext)
}

/// Seal `plain_len` bytes from `reader` into `writer`.
///
/// Returns the number of sealed bytes written.
pub async fn seal_stream<R, W>(
    key: &SessionKey,
    reader: &mut R,
    plain_len: u64,
    chunk_size: u64,
    writer: &mut W,
) -> Result<u64, SealError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    check_chunk_size(chunk_size)?;
    let plan = ChunkPlan::new(plain_len, chunk_size)?;
    let cipher = ChunkCipher::new(key);
    let mut written = 0u64;

    for chunk in &plan {
        let mut buf = vec![0u8; chunk.len() as usize];
        reader.read_exact(&mut buf).await?;
        let sealed = cipher.seal(&buf, chunk.index, chunk.total_chunks)?;
        writer.write_all(&sealed).await?;
        written += sealed.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

/// Open a sealed stream of `sealed_len` bytes from `reader` into `writer`.
///
/// Each chunk's plaintext is written only after that chunk verifies. On the
/// first failure the call returns without touching any later chunk; bytes
/// already written belong to chunks that did verify.
///
/// Returns the number of plaintext bytes written.
pub async fn open_stream<R, W>(
    key: &SessionKey,
    reader: &mut R,
    sealed_len: u64,
    chunk_size: u64,
    writer: &mut W,
) -> Result<u64, SealError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    check_chunk_size(chunk_size)?;
    let sealed_chunk_size = chunk_size + SEAL_OVERHEAD as u64;
    let plan = ChunkPlan::new(sealed_len, sealed_chunk_size)?;
    let mut opener = ChunkOpener::new(key, plan.len());
    let mut written = 0u64;

    for chunk in &plan {
        let len = chunk.len() as usize;
        if len < SEAL_OVERHEAD {
            return Err(SealError::Truncated {
                len,
                min: SEAL_OVERHEAD,
            });
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        let plaintext = opener.open_next(&buf)?;
        writer.write_all(&plaintext).await?;
        written += plaintext.len() as u64;
    }

    opener.finish()?;
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::seal_chunk;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([0x11; 32])
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn seal_all(key: &SessionKey, data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        let pieces: Vec<&[u8]> = data.chunks(chunk_size).collect();
        let total = pieces.len() as u32;
        pieces
            .iter()
            .enumerate()
            .map(|(i, p)| seal_chunk(key, p, i as u32 + 1, total).unwrap())
            .collect()
    }

    #[test]
    fn sealed_len_counts_overhead_per_chunk() {
        assert_eq!(sealed_len(10, 4).unwrap(), 10 + 3 * SEAL_OVERHEAD as u64);
        assert_eq!(sealed_len(0, 4).unwrap(), 0);
        assert!(sealed_len(10, 0).is_err());
    }

    #[test]
    fn open_chunks_recovers_plaintext() {
        let key = test_key();
        let data = sample(1000);
        let sealed = seal_all(&key, &data, 300);

        assert_eq!(open_chunks(&key, &sealed).unwrap(), data);
    }

    #[test]
    fn open_chunks_rejects_reordering() {
        let key = test_key();
        let mut sealed = seal_all(&key, &sample(900), 300);
        sealed.swap(0, 1);

        assert!(matches!(
            open_chunks(&key, &sealed),
            Err(SealError::AuthenticationFailed)
        ));
    }

    #[test]
    fn open_chunks_rejects_dropped_chunk() {
        let key = test_key();
        let mut sealed = seal_all(&key, &sample(900), 300);
        sealed.pop();

        // Remaining chunks were bound to total = 3
        assert!(open_chunks(&key, &sealed).is_err());
    }

    #[test]
    fn opener_is_poisoned_after_failure() {
        let key = test_key();
        let sealed = seal_all(&key, &sample(900), 300);
        let mut bad = sealed[0].clone();
        bad[30] ^= 0xFF;

        let mut opener = ChunkOpener::new(&key, 3);
        assert!(opener.open_next(&bad).is_err());
        // A valid chunk afterwards is still refused
        assert!(opener.open_next(&sealed[1]).is_err());
        assert!(opener.finish().is_err());
    }

    #[test]
    fn opener_finish_requires_all_chunks() {
        let key = test_key();
        let sealed = seal_all(&key, &sample(900), 300);

        let mut opener = ChunkOpener::new(&key, 3);
        opener.open_next(&sealed[0]).unwrap();
        opener.open_next(&sealed[1]).unwrap();
        assert_eq!(opener.next_index(), 3);
        assert!(opener.finish().is_err());
    }

    #[tokio::test]
    async fn stream_roundtrip() {
        let key = test_key();
        let data = sample(10_000);

        let mut sealed = Vec::new();
        let n = seal_stream(&key, &mut data.as_slice(), data.len() as u64, 4096, &mut sealed)
            .await
            .unwrap();
        assert_eq!(n, sealed.len() as u64);
        assert_eq!(n, sealed_len(data.len() as u64, 4096).unwrap());

        let mut opened = Vec::new();
        let m = open_stream(&key, &mut sealed.as_slice(), n, 4096, &mut opened)
            .await
            .unwrap();
        assert_eq!(m, data.len() as u64);
        assert_eq!(opened, data);
    }

    #[tokio::test]
    async fn stream_matches_chunkwise_sealing() {
        let key = test_key();
        let data = sample(700);

        let mut sealed = Vec::new();
        seal_stream(&key, &mut data.as_slice(), 700, 300, &mut sealed)
            .await
            .unwrap();

        // Split the stream at sealed-chunk boundaries and open as a list
        let parts: Vec<&[u8]> = sealed.chunks(300 + SEAL_OVERHEAD).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(open_chunks(&key, &parts).unwrap(), data);
    }

    #[tokio::test]
    async fn tampered_middle_chunk_stops_output() {
        let key = test_key();
        let data = sample(900);
        let mut sealed = Vec::new();
        seal_stream(&key, &mut data.as_slice(), 900, 300, &mut sealed)
            .await
            .unwrap();

        // Flip the last tag byte of chunk 2
        let sealed_chunk = 300 + SEAL_OVERHEAD;
        sealed[2 * sealed_chunk - 1] ^= 0x01;

        let mut out = Vec::new();
        let result = open_stream(
            &key,
            &mut sealed.as_slice(),
            sealed.len() as u64,
            300,
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(SealError::AuthenticationFailed)));
        // Chunk 1 verified and was written; chunk 3 was never released
        assert_eq!(out, &data[..300]);
    }

    #[tokio::test]
    async fn truncated_tail_rejected() {
        let key = test_key();
        let data = sample(900);
        let mut sealed = Vec::new();
        seal_stream(&key, &mut data.as_slice(), 900, 300, &mut sealed)
            .await
            .unwrap();

        // Leave a trailing fragment too short to be a sealed chunk
        let cut = 2 * (300 + SEAL_OVERHEAD) + 10;
        let mut out = Vec::new();
        let result = open_stream(&key, &mut &sealed[..cut], cut as u64, 300, &mut out).await;

        assert!(matches!(result, Err(SealError::Truncated { len: 10, .. })));
        assert_eq!(out.len(), 600);
    }

    #[tokio::test]
    async fn wrong_chunk_size_fails_closed() {
        let key = test_key();
        let data = sample(900);
        let mut sealed = Vec::new();
        seal_stream(&key, &mut data.as_slice(), 900, 300, &mut sealed)
            .await
            .unwrap();

        let mut out = Vec::new();
        let result = open_stream(
            &key,
            &mut sealed.as_slice(),
            sealed.len() as u64,
            200,
            &mut out,
        )
        .await;

        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn oversized_chunk_size_rejected_before_reading() {
        let key = test_key();
        let data = b"hello".to_vec();

        let mut sealed = Vec::new();
        let result = seal_stream(&key, &mut data.as_slice(), 5, u64::MAX, &mut sealed).await;
        assert!(matches!(
            result,
            Err(SealError::ChunkTooLarge { chunk_size: u64::MAX, .. })
        ));
        assert!(sealed.is_empty());

        let mut reader: &[u8] = &[0u8; 45];
        let mut out = Vec::new();
        let result = open_stream(&key, &mut reader, 45, u64::MAX, &mut out).await;
        assert!(matches!(result, Err(SealError::ChunkTooLarge { .. })));
        // Nothing was consumed from the reader
        assert_eq!(reader.len(), 45);
        assert!(out.is_empty());

        let too_big = MAX_CHUNK_SIZE as u64 + 1;
        let result = open_stream(&key, &mut &[0u8; 45][..], 45, too_big, &mut out).await;
        assert_eq!(result.unwrap_err().kind(), xfer_types::ErrorKind::Planning);
    }

    #[tokio::test]
    async fn largest_chunk_size_still_opens() {
        let key = test_key();
        let data = sample(1000);
        let chunk_size = MAX_CHUNK_SIZE as u64;

        let mut sealed = Vec::new();
        seal_stream(&key, &mut data.as_slice(), 1000, chunk_size, &mut sealed)
            .await
            .unwrap();

        let mut out = Vec::new();
        open_stream(
            &key,
            &mut sealed.as_slice(),
            sealed.len() as u64,
            chunk_size,
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn short_reader_is_io_error() {
        let key = test_key();
        let data = sample(100);
        let mut sealed = Vec::new();

        let result = seal_stream(&key, &mut data.as_slice(), 200, 64, &mut sealed).await;
        assert!(matches!(result, Err(SealError::Io(_))));
    }
}
