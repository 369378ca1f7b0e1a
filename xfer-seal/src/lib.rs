//! # xfer-seal
//!
//! Per-chunk envelope encryption for pwx-xfer.
//!
//! Every chunk of an upload is sealed on the client before it leaves the
//! machine. The server stores opaque sealed chunks; only holders of the
//! share link (which carries the key in its fragment) can open them.
//!
//! ## Chunk Envelope
//!
//! ```text
//! plaintext chunk ──► XChaCha20-Poly1305 ──► nonce (24) ‖ ciphertext ‖ tag (16)
//!                        ↑           ↑
//!                 SessionKey     AAD = "pwx-xfer-chunk-v1" ‖ index ‖ totalChunks
//! ```
//!
//! 1. Generate one [`SessionKey`] per upload from the OS CSPRNG
//! 2. Seal each chunk with a fresh random 192-bit nonce
//! 3. Bind the chunk's 1-based index and the chunk count into the AAD
//! 4. Open in order, releasing plaintext only for chunks that verify
//!
//! ## Example
//!
//! ```rust,ignore
//! use pwx_xfer_seal::{open_chunks, ChunkCipher, SessionKey, SealError};
//!
//! # fn example() -> Result<(), SealError> {
//! let key = SessionKey::generate()?;
//! let cipher = ChunkCipher::new(&key);
//!
//! let first = cipher.seal(b"hello, ", 1, 2)?;
//! let last = cipher.seal(b"world", 2, 2)?;
//!
//! let plaintext = open_chunks(&key, &[first, last])?;
//! assert_eq!(plaintext, b"hello, world");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cipher;
mod error;
mod key;
mod stream;

pub use cipher::{
    chunk_aad, open_chunk, seal_chunk, ChunkCipher, MAX_CHUNK_SIZE, NONCE_SIZE, SEAL_OVERHEAD,
    TAG_SIZE,
};
pub use error::SealError;
pub use key::{SessionKey, KEY_SIZE};
pub use stream::{open_chunks, open_stream, seal_stream, sealed_len, ChunkOpener};
