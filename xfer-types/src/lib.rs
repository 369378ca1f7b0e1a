//! # xfer-types
//!
//! Wire format types for pwx-xfer chunked, end-to-end encrypted uploads.
//!
//! This crate provides the foundational types used across all pwx-xfer crates:
//! - [`FileId`] - Server-assigned identifier correlating the chunks of one upload
//! - [`ChunkDescriptor`] - One planned byte range of the source file
//! - [`Acknowledgment`] - The submit-chunk endpoint's JSON response
//! - [`SessionMetadata`] - Opaque form fields sent with the first chunk only
//! - [`ErrorKind`] / [`WireError`] - Error classification shared by every crate

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod wire;

pub use error::{ErrorKind, WireError};
pub use ids::FileId;
pub use wire::{
    fields, Acknowledgment, ChunkDescriptor, ContentRange, SessionMetadata, SEAL_CONTENT_TYPE,
};
