//! Fixed-window, per-identity rate limiting
//!
//! Buckets live in process memory only. Nothing is shared between instances
//! and everything is forgotten on restart, so this is burst protection rather
//! than an enforceable quota.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::clock::{elapsed_ms, Clock, SystemClock};

/// Default window length
pub const WINDOW_MS: u64 = 60_000;

/// Default admissions per window
pub const MAX_REQUESTS: u32 = 20;

/// Counter for one identity
#[derive(Debug, Clone, Copy)]
struct RateLimitBucket {
    count: u32,
    window_started_at: DateTime<Utc>,
}

/// Per-identity fixed-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    window_ms: u64,
    max_requests: u32,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
}

impl RateLimiter {
    /// Create a limiter with its own window and capacity
    pub fn new(window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            max_requests,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// 20 requests per 60 s on the system clock
    pub fn with_defaults() -> Self {
        Self::new(
            Duration::from_millis(WINDOW_MS),
            MAX_REQUESTS,
            Arc::new(SystemClock),
        )
    }

    /// Try to admit one request for `identity`
    ///
    /// Returns `None` when admitted, otherwise how long the caller must wait
    /// before the window resets.
    pub async fn consume_token(&self, identity: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;

        let window_ms = self.window_ms;
        buckets.retain(|_, bucket| elapsed_ms(bucket.window_started_at, now) < window_ms);

        match buckets.get_mut(identity) {
            None => {
                buckets.insert(
                    identity.to_string(),
                    RateLimitBucket {
                        count: 1,
                        window_started_at: now,
                    },
                );
                None
            }
            Some(bucket) if bucket.count < self.max_requests => {
                bucket.count += 1;
                None
            }
            Some(bucket) => {
                let elapsed = elapsed_ms(bucket.window_started_at, now);
                let retry_after = Duration::from_millis(window_ms.saturating_sub(elapsed));
                debug!(
                    "Rate limit hit, {} requests in window, retry after {:?}",
                    bucket.count, retry_after
                );
                Some(retry_after)
            }
        }
    }

    /// Number of live buckets
    pub async fn tracked_identities(&self) -> usize {
        self.buckets.lock().await.len()
    }

    /// Forget every bucket
    pub async fn reset(&self) {
        self.buckets.lock().await.clear();
    }

    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Admissions per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn limiter(clock: &ManualClock) -> RateLimiter {
        RateLimiter::new(
            Duration::from_millis(WINDOW_MS),
            MAX_REQUESTS,
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_admits_up_to_capacity() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        for _ in 0..MAX_REQUESTS {
            assert_eq!(limiter.consume_token("alice").await, None);
        }

        let retry_after = limiter.consume_token("alice").await.unwrap();
        assert!(retry_after <= Duration::from_millis(WINDOW_MS));
        assert!(retry_after > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_after_shrinks_with_time() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        for _ in 0..MAX_REQUESTS {
            limiter.consume_token("alice").await;
        }
        clock.advance(Duration::from_secs(45));

        assert_eq!(
            limiter.consume_token("alice").await,
            Some(Duration::from_secs(15))
        );
    }

    #[tokio::test]
    async fn test_window_reset_admits_again() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        for _ in 0..=MAX_REQUESTS {
            limiter.consume_token("alice").await;
        }
        assert!(limiter.consume_token("alice").await.is_some());

        clock.advance(Duration::from_millis(WINDOW_MS));

        assert_eq!(limiter.consume_token("alice").await, None);
        for _ in 1..MAX_REQUESTS {
            assert_eq!(limiter.consume_token("alice").await, None);
        }
        assert!(limiter.consume_token("alice").await.is_some());
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        for _ in 0..MAX_REQUESTS {
            limiter.consume_token("alice").await;
        }

        assert!(limiter.consume_token("alice").await.is_some());
        assert_eq!(limiter.consume_token("bob").await, None);
    }

    #[tokio::test]
    async fn test_expired_buckets_are_swept() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        limiter.consume_token("alice").await;
        limiter.consume_token("bob").await;
        assert_eq!(limiter.tracked_identities().await, 2);

        clock.advance(Duration::from_millis(WINDOW_MS + 1));
        limiter.consume_token("carol").await;

        assert_eq!(limiter.tracked_identities().await, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let clock = ManualClock::default();
        let limiter = limiter(&clock);

        for _ in 0..MAX_REQUESTS {
            limiter.consume_token("alice").await;
        }
        limiter.reset().await;

        assert_eq!(limiter.tracked_identities().await, 0);
        assert_eq!(limiter.consume_token("alice").await, None);
    }
}
