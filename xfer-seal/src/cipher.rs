//! Per-chunk envelope encryption using XChaCha20-Poly1305.
//!
//! Each chunk is sealed independently with the session key and a fresh
//! random 192-bit nonce. The chunk's position (`index`, `total_chunks`) is
//! bound into the associated data, so a sealed chunk moved to another slot,
//! or opened against a stream with a different chunk count, fails
//! authentication.
//!
//! Sealed layout: `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::error::SealError;
use crate::key::SessionKey;

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// Bytes added to every chunk by sealing.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Maximum plaintext size for one chunk (64 MB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Domain separator for the associated data; bumps if the layout changes.
const AAD_DOMAIN: &[u8] = b"pwx-xfer-chunk-v1";

/// Associated data binding a chunk to its position in the stream.
///
/// `domain || index (u32 BE) || total_chunks (u32 BE)`.
pub fn chunk_aad(index: u32, total_chunks: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 8);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(&index.to_be_bytes());
    aad.extend_from_slice(&total_chunks.to_be_bytes());
    aad
}

/// Chunk sealer/opener bound to one session key.
pub struct ChunkCipher {
    aead: XChaCha20Poly1305,
}

impl ChunkCipher {
    /// Create a cipher for the given session key.
    pub fn new(key: &SessionKey) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Seal one chunk at position `index` of `total_chunks`.
    ///
    /// Chunk indices are 1-based, matching the wire protocol.
    pub fn seal(
        &self,
        plaintext: &[u8],
        index: u32,
        total_chunks: u32,
    ) -> Result<Vec<u8>, SealError> {
        if plaintext.len() > MAX_CHUNK_SIZE {
            return Err(SealError::EncryptionFailed(format!(
                "chunk too large: {} bytes (max {})",
                plaintext.len(),
                MAX_CHUNK_SIZE
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| SealError::EncryptionFailed(format!("CSPRNG unavailable: {e}")))?;
        let nonce = XNonce::from_slice(&nonce_bytes);

        let aad = chunk_aad(index, total_chunks);
        let ciphertext = self
            .aead
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| SealError::EncryptionFailed("cipher rejected chunk".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open one sealed chunk expected at position `index` of `total_chunks`.
    pub fn open(&self, sealed: &[u8], index: u32, total_chunks: u32) -> Result<Vec<u8>, SealError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(SealError::Truncated {
                len: sealed.len(),
                min: SEAL_OVERHEAD,
            });
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let aad = chunk_aad(index, total_chunks);

        self.aead
            .decrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| SealError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCipher").finish_non_exhaustive()
    }
}

/// Seal a single chunk with a one-off cipher.
pub fn seal_chunk(
    key: &SessionKey,
    plaintext: &[u8],
    index: u32,
    total_chunks: u32,
) -> Result<Vec<u8>, SealError> {
    ChunkCipher::new(key).seal(plaintext, index, total_chunks)
}

/// Open a single chunk with a one-off cipher.
pub fn open_chunk(
    key: &SessionKey,
    sealed: &[u8],
    index: u32,
    total_chunks: u32,
) -> Result<Vec<u8>, SealError> {
    ChunkCipher::new(key).open(sealed, index, total_chunks)
}
