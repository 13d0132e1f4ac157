//! Token bucket rate limiter shared by every caller of one API family.
//!
//! The bucket starts full with `capacity == rate` tokens and refills continuously.
//! Callers queue on a fair async mutex and keep holding it while they sleep for the
//! next token, so waiters are served in arrival order and nobody skips the wait.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Mutable bucket state.
#[derive(Debug)]
struct Bucket {
    /// Tokens currently available, may dip marginally below zero from float rounding.
    tokens: f64,
    /// Last time tokens were added.
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests per second, `None` when unlimited.
    rate: Option<u32>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter allowing `per_second` requests per second; zero means unlimited.
    pub fn new(per_second: u32) -> Self {
        let rate = (per_second > 0).then_some(per_second);
        Self {
            rate,
            bucket: Mutex::new(Bucket {
                tokens: per_second as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Creates a limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured requests per second.
    pub fn rate(&self) -> Option<u32> {
        self.rate
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        let Some(rate) = self.rate else {
            return;
        };
        let rate = rate as f64;
        let capacity = rate;

        let mut bucket = self.bucket.lock().await;
        bucket.refill(rate, capacity);

        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / rate);
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
            bucket.refill(rate, capacity);
        }

        bucket.tokens -= 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn burst(limiter: Arc<RateLimiter>, calls: usize) -> Duration {
        let start = Instant::now();
        let handles: Vec<_> = (0..calls)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_times_rate_takes_at_least_four_seconds() {
        let rate = 6;
        let limiter = Arc::new(RateLimiter::new(rate));

        let elapsed = burst(limiter, 5 * rate as usize).await;

        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_per_second_limiter() {
        let limiter = Arc::new(RateLimiter::new(1));
        let elapsed = burst(limiter, 5).await;
        assert!(elapsed >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_capacity_does_not_wait() {
        let limiter = Arc::new(RateLimiter::new(10));
        let elapsed = burst(limiter, 10).await;
        assert!(elapsed < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let limiter = Arc::new(RateLimiter::unlimited());
        assert_eq!(limiter.rate(), None);
        let elapsed = burst(limiter, 1000).await;
        assert!(elapsed < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_idle_restores_capacity() {
        let limiter = Arc::new(RateLimiter::new(5));
        burst(Arc::clone(&limiter), 5).await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        let elapsed = burst(limiter, 5).await;
        assert!(elapsed < Duration::from_millis(1));
    }
}
