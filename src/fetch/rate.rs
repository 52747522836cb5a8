//! Request pacing for the source downloader

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token bucket shared by all download workers.
///
/// Tokens regenerate continuously at `rate` per second and are capped at one
/// second's worth. The bucket starts full.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = capacity.min(self.tokens + elapsed * rate);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// Create a limiter allowing `rate` requests per second.
    ///
    /// The cap never drops below one token, so a rate under 1/s still
    /// admits requests instead of waiting forever.
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        let capacity = rate.max(1.0);
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Requests per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Take one token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.rate, self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(self.rate, self.capacity);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Tokens currently in the bucket
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.rate, self.capacity);
        bucket.tokens
    }
}

/// Delay before retry number `retry` (0-based): `base * 2^retry`
pub fn retry_delay(retry: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_one_second_of_tokens() {
        let limiter = RateLimiter::new(5.0);
        for _ in 0..5 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = RateLimiter::new(20.0);
        for _ in 0..20 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn slow_rate_still_admits_one_request() {
        let limiter = RateLimiter::new(0.5);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        assert!(limiter.available().await < 1.0);
    }

    #[test]
    fn retry_delay_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(0, base), Duration::from_secs(1));
        assert_eq!(retry_delay(1, base), Duration::from_secs(2));
        assert_eq!(retry_delay(2, base), Duration::from_secs(4));
        assert_eq!(retry_delay(40, base), base.saturating_mul(u32::MAX));
    }
}
