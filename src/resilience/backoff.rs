//! Linear backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the retry that follows `attempt` (0-based).
///
/// `attempt * base` plus a random jitter in `[0, max_jitter)`.
pub fn linear_backoff(attempt: u32, base: Duration, max_jitter: Duration) -> Duration {
    let jitter_range = max_jitter.as_millis() as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    base.saturating_mul(attempt) + Duration::from_millis(jitter)
}
