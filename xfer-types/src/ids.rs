//! Identity types for pwx-xfer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier for one upload.
///
/// Opaque to the client: it is returned by the first chunk's acknowledgment
/// and echoed back as `fileID` on every later chunk of the same upload.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Wrap a server-issued token.
    ///
    /// Returns `None` for an empty or whitespace-only token, which the
    /// protocol treats the same as a missing identifier.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Get the token as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}
