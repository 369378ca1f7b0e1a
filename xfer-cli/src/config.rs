//! Configuration loading for xfer.
//!
//! Configuration is loaded from a TOML file (default: `xfer.toml` in the
//! platform config directory). Every field has a default, so a missing
//! section or an empty file is valid. Command-line flags override values
//! read from the file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xfer_client::{UploadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENCY};
use xfer_types::{SessionMetadata, WireError};

/// Root configuration for xfer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Upload configuration.
    #[serde(default)]
    pub upload: UploadSection,
    /// Form fields sent with the first chunk of every upload.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    /// Submit-chunk endpoint URL (no default; required for real uploads).
    pub endpoint: Option<String>,

    /// Plaintext chunk size in bytes (default: 5MB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Interior chunks in flight at once (default: 4).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout in seconds (default: 60).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Resubmissions per chunk after a network error (default: 0).
    #[serde(default)]
    pub retries: u32,
}

// Default value functions

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            chunk_size: default_chunk_size(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
            retries: 0,
        }
    }
}

impl UploadSection {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from an explicit path, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Session metadata from the `[metadata]` table.
    pub fn session_metadata(&self) -> Result<SessionMetadata, ConfigError> {
        SessionMetadata::from_pairs(self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(ConfigError::InvalidMetadata)
    }

    /// Upload settings for the session itself.
    pub fn upload_config(&self) -> Result<UploadConfig, ConfigError> {
        Ok(UploadConfig::default()
            .with_chunk_size(self.upload.chunk_size)
            .with_max_concurrency(self.upload.max_concurrency)
            .with_metadata(self.session_metadata()?))
    }
}

/// Default config file location (`<config dir>/xfer.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("exchange", "password", "xfer")
        .map(|dirs| dirs.config_dir().join("xfer.toml"))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },

    /// A `[metadata]` entry uses a reserved or empty field name.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(#[source] WireError),
}
