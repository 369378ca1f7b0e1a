//! Session key material.
//!
//! One key per upload session, drawn from the OS CSPRNG. The key never
//! reaches the submit-chunk endpoint: it travels out-of-band as the fragment
//! of the share link (`<retrieval URL>#<base64url key>`), which browsers and
//! HTTP clients do not transmit.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SealError;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Symmetric key for every chunk of one upload.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, SealError> {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| SealError::EncryptionFailed(format!("CSPRNG unavailable: {e}")))?;
        Ok(Self(bytes))
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Wrap a key given as a slice of exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SealError> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            SealError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encode for use as a URL fragment (base64url, no padding).
    pub fn to_fragment(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode a key from a fragment or from a full share link.
    ///
    /// Anything up to and including the last `#` is ignored. Both the
    /// URL-safe and the standard base64 alphabets are accepted, with or
    /// without padding.
    pub fn from_fragment(input: &str) -> Result<Self, SealError> {
        let fragment = input
            .rsplit_once('#')
            .map(|(_, f)| f)
            .unwrap_or(input)
            .trim();
        if fragment.is_empty() {
            return Err(SealError::InvalidKey("empty key fragment".into()));
        }

        let mut decoded = [URL_SAFE_NO_PAD, URL_SAFE, STANDARD, STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(fragment).ok())
            .ok_or_else(|| SealError::InvalidKey("key fragment is not base64".into()))?;

        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Append the key to a retrieval URL, replacing any existing fragment.
    pub fn share_url(&self, retrieval_url: &str) -> String {
        let base = retrieval_url
            .split_once('#')
            .map(|(b, _)| b)
            .unwrap_or(retrieval_url);
        format!("{base}#{}", self.to_fragment())
    }
}

// Don't leak key material in debug output
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = SessionKey::generate().unwrap();
        let b = SessionKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn fragment_roundtrip() {
        let key = SessionKey::generate().unwrap();
        let fragment = key.to_fragment();

        assert!(!fragment.contains('='));
        assert!(!fragment.contains('+') && !fragment.contains('/'));
        let back = SessionKey::from_fragment(&fragment).unwrap();
        assert_eq!(back.as_bytes(), key.as_bytes());
    }

    #[test]
    fn from_fragment_accepts_share_url() {
        let key = SessionKey::from_bytes([0xFB; KEY_SIZE]);
        let url = key.share_url("https://password.exchange/d/abc");

        assert!(url.starts_with("https://password.exchange/d/abc#"));
        let back = SessionKey::from_fragment(&url).unwrap();
        assert_eq!(back.as_bytes(), key.as_bytes());
    }

    #[test]
    fn from_fragment_accepts_standard_base64() {
        let key = SessionKey::from_bytes([0xFB; KEY_SIZE]);
        let standard = STANDARD.encode(key.as_bytes());
        assert!(standard.contains('+') || standard.contains('/'));

        let back = SessionKey::from_fragment(&standard).unwrap();
        assert_eq!(back.as_bytes(), key.as_bytes());
    }

    #[test]
    fn share_url_replaces_existing_fragment() {
        let key = SessionKey::from_bytes([1; KEY_SIZE]);
        let url = key.share_url("https://x/abc#old");
        assert_eq!(url.matches('#').count(), 1);
        assert!(url.ends_with(&key.to_fragment()));
    }

    #[test]
    fn from_fragment_rejects_bad_input() {
        assert!(matches!(
            SessionKey::from_fragment("https://x/abc#"),
            Err(SealError::InvalidKey(_))
        ));
        assert!(matches!(
            SessionKey::from_fragment("!!not base64!!"),
            Err(SealError::InvalidKey(_))
        ));
        // Valid base64, wrong length (16-byte key)
        assert!(matches!(
            SessionKey::from_fragment(&URL_SAFE_NO_PAD.encode([0u8; 16])),
            Err(SealError::InvalidKey(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let key = SessionKey::from_bytes([0xAB; KEY_SIZE]);
        let debug = format!("{:?}", key);
        assert_eq!(debug, "SessionKey([REDACTED])");
        assert!(!debug.contains("ab"));
    }
}
