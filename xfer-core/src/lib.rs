//! # xfer-core
//!
//! Pure logic for pwx-xfer uploads (no I/O, instant tests).
//!
//! This crate implements the chunk planner, the upload state machine and the
//! progress accounting without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (reading file slices, sealing, HTTP) is performed by
//! `xfer-client`, which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod planner;
pub mod progress;
pub mod state;

pub use backoff::retry_delay;
pub use planner::{ChunkIter, ChunkPlan, PlanError};
pub use progress::ProgressTracker;
pub use state::{Action, Event, Phase, UploadState};
