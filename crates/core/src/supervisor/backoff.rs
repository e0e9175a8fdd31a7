//! Pure exponential-backoff-with-jitter, pulled out of the actor body so it
//! can be unit tested without spinning up a transport (§4.5 retry policy).

use std::time::Duration;

pub const MAX_RETRIES: u32 = 5;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// `jitter_fn` returns a value in `[0.0, 1.0)`; callers pass a real RNG in
/// production and a fixed value in tests for determinism.
pub fn next_delay(attempt: u32, base: Duration, cap: Duration, jitter_fn: impl Fn() -> f64) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(20));
    let capped = exp.min(cap.as_millis());
    let jittered = (capped as f64 * (0.5 + 0.5 * jitter_fn())) as u64;
    Duration::from_millis(jittered)
}

pub fn retries_exhausted(attempt: u32) -> bool {
    attempt >= MAX_RETRIES
}
