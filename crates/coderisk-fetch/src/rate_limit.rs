//! Forge quota management.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::warn;

pub type ForgeLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket sized to the forge quota (default 5k req/hour). Callers
/// `acquire()` before every request; the bucket allows short bursts.
pub fn forge_limiter(requests_per_hour: u32) -> ForgeLimiter {
    let per_hour = NonZeroU32::new(requests_per_hour.max(1)).expect("nonzero quota");
    let burst = NonZeroU32::new((requests_per_hour / 100).clamp(1, 50)).expect("nonzero burst");
    RateLimiter::direct(Quota::per_hour(per_hour).allow_burst(burst))
}

pub async fn acquire(limiter: &ForgeLimiter) {
    limiter.until_ready().await;
}

/// Exponential backoff with jitter for retryable failures (HTTP 403
/// secondary limits, transient network errors). Attempt 0 waits ~1s,
/// doubling each time, capped at 60s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1_000u64.saturating_mul(1 << attempt.min(6));
    let jitter = fastrand::u64(0..=base_ms / 2);
    Duration::from_millis((base_ms + jitter).min(60_000))
}

pub async fn backoff(attempt: u32, reason: &str) {
    let delay = backoff_delay(attempt);
    warn!(attempt, ?delay, reason, "backing off");
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let d0 = backoff_delay(0);
        assert!(d0 >= Duration::from_millis(1_000));
        assert!(d0 <= Duration::from_millis(1_500));

        let d_large = backoff_delay(30);
        assert!(d_large <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn limiter_allows_initial_burst() {
        let limiter = forge_limiter(5_000);
        // burst capacity admits the first request without sleeping
        acquire(&limiter).await;
    }
}
