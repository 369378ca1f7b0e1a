//! Fractional upload progress.
//!
//! Progress is `(acknowledged chunks + partial bytes of in-flight chunks) /
//! total chunks`. Every interior chunk reports its own byte progress, so the
//! tracker must be shared behind a lock by the caller; it is a plain value
//! type here so the arithmetic stays testable without async.

use std::collections::{BTreeMap, BTreeSet};

/// Tracks per-chunk acknowledgment and byte progress for one upload.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    total_chunks: u32,
    acked: BTreeSet<u32>,
    in_flight: BTreeMap<u32, (u64, u64)>,
    reported: f64,
}

impl ProgressTracker {
    /// Create a tracker for `total_chunks` chunks.
    pub fn new(total_chunks: u32) -> Self {
        Self {
            total_chunks,
            ..Self::default()
        }
    }

    /// Record `sent` of `total` payload bytes for a chunk, returning the new
    /// overall fraction. Ignored for chunks already acknowledged.
    pub fn on_bytes_sent(&mut self, index: u32, sent: u64, total: u64) -> f64 {
        if !self.acked.contains(&index) && self.is_known(index) {
            self.in_flight.insert(index, (sent.min(total), total));
        }
        self.recompute()
    }

    /// Record an acknowledgment. Returns `true` the first time a chunk is
    /// acknowledged; duplicates leave the count unchanged.
    pub fn on_acked(&mut self, index: u32) -> bool {
        if !self.is_known(index) {
            return false;
        }
        self.in_flight.remove(&index);
        let inserted = self.acked.insert(index);
        self.recompute();
        inserted
    }

    /// Forget the partial bytes of a chunk whose submission failed.
    pub fn on_failed(&mut self, index: u32) {
        self.in_flight.remove(&index);
    }

    /// Number of distinct chunks acknowledged.
    pub fn acknowledged(&self) -> u32 {
        self.acked.len() as u32
    }

    /// Overall fraction in `0.0..=1.0`. Never decreases.
    pub fn fraction(&self) -> f64 {
        self.reported
    }

    fn is_known(&self, index: u32) -> bool {
        index >= 1 && index <= self.total_chunks
    }

    fn recompute(&mut self) -> f64 {
        if self.total_chunks == 0 {
            return self.reported;
        }

        let partial: f64 = self
            .in_flight
            .values()
            .filter(|(_, total)| *total > 0)
            .map(|(sent, total)| *sent as f64 / *total as f64)
            .sum();
        let fraction = (self.acked.len() as f64 + partial) / f64::from(self.total_chunks);

        // Retried chunks restart at zero bytes; keep the reported value monotonic.
        self.reported = self.reported.max(fraction.clamp(0.0, 1.0));
        self.reported
    }
}
