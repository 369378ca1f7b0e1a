//! Retry delays for chunk resubmission.
//!
//! Uses exponential backoff with random jitter so concurrent interior chunks
//! that failed together do not hammer the endpoint in lockstep.

use std::time::Duration;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// Formula: min(max, base * 2^(attempt-1)) + random(0..=base/2)
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    let backoff = base.saturating_mul(factor).min(max);

    let jitter_cap = (base / 2).as_millis() as u64;
    backoff + Duration::from_millis(random_jitter_ms(jitter_cap))
}

/// Random jitter between 0 and `cap` milliseconds inclusive.
///
/// Falls back to no jitter if the OS RNG is unavailable; jitter is not a
/// security property.
fn random_jitter_ms(cap: u64) -> u64 {
    if cap == 0 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % (cap + 1),
        Err(_) => 0,
    }
}
