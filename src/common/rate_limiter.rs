//! Rate Limiter implementation using token bucket algorithm
//!
//! Keeps requests within the per-minute quotas enforced by the API.
//! Tokens are refilled lazily from the elapsed time on every access;
//! there is no background timer.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Returned when the cancellation token fires before a token became available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct WaitCancelled;

/// Configuration for the rate limiter
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Requests allowed per period (also the bucket capacity)
    pub max_requests: u32,
    /// Window the quota applies to
    pub period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            period: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Quota expressed as requests per minute
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            period: Duration::from_secs(60),
        }
    }

    /// Set the number of requests allowed per period
    pub fn with_rate(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the quota period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_requests) / self.period.as_secs_f64()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        }
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }
}

/// Rate limiter using token bucket algorithm
///
/// The bucket starts full. A caller that finds it empty sleeps until the
/// next token is due while still holding the bucket lock, so waiters are
/// served one at a time in the order they started waiting.
///
/// # Example
///
/// ```
/// use delijn_client::common::{RateLimiter, RateLimiterConfig};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new(RateLimiterConfig::per_minute(240));
///     let cancel = CancellationToken::new();
///
///     // Acquire a token before making a request
///     limiter.acquire(&cancel).await.unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = f64::from(config.max_requests);
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            refill_rate: config.refill_rate(),
        }
    }

    /// Create a rate limiter allowing `max_requests` per `period`
    pub fn with_rate(max_requests: u32, period: Duration) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(max_requests).with_period(period))
    }

    /// Wait for a token and consume it
    ///
    /// Returns immediately when a token is available. Otherwise sleeps
    /// until one is due, or returns [`WaitCancelled`] without consuming
    /// anything if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.capacity, self.refill_rate);

        if bucket.tokens >= 1.0 {
            bucket.take();
            return Ok(());
        }

        // A zero quota never refills; the wait then only ends on cancellation
        let wait = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            .unwrap_or(Duration::MAX);
        tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for token");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WaitCancelled),
            _ = sleep(wait) => {
                bucket.refill(self.capacity, self.refill_rate);
                bucket.take();
                Ok(())
            }
        }
    }

    /// Number of whole tokens currently available (does not consume)
    pub async fn available(&self) -> u32 {
        self.tokens().await.floor() as u32
    }

    /// Current fractional token level after refill
    pub async fn tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.capacity, self.refill_rate);
        bucket.tokens
    }

    /// Bucket capacity (the configured quota)
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tokio::time::advance;

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_requests, 10);
        assert_eq!(config.period, Duration::from_secs(1));
    }

    #[test]
    fn test_per_minute_refill_rate() {
        assert_abs_diff_eq!(RateLimiterConfig::per_minute(240).refill_rate(), 4.0);
        assert_abs_diff_eq!(RateLimiterConfig::per_minute(6000).refill_rate(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_tokens() {
        let limiter = RateLimiter::with_rate(10, Duration::from_secs(1));
        assert_eq!(limiter.available().await, 10);
        assert_eq!(limiter.capacity(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_consumes_tokens() {
        let limiter = RateLimiter::with_rate(5, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            limiter.acquire(&cancel).await.unwrap();
        }

        assert_eq!(limiter.available().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_elapsed_time() {
        // 100 tokens per second = 1 token per 10ms
        let limiter = RateLimiter::with_rate(100, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        for _ in 0..100 {
            limiter.acquire(&cancel).await.unwrap();
        }

        advance(Duration::from_millis(50)).await;

        assert_abs_diff_eq!(limiter.tokens().await, 5.0, epsilon = 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::with_rate(3, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).await.unwrap();
        advance(Duration::from_secs(3600)).await;

        assert_abs_diff_eq!(limiter.tokens().await, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_acquire_waits_for_refill() {
        let limiter = RateLimiter::with_rate(5, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(&cancel).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(210));

        let tokens = limiter.tokens().await;
        assert!((0.0..1.0).contains(&tokens));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_consumes_nothing() {
        let limiter = RateLimiter::with_rate(1, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).await.unwrap();
        cancel.cancel();

        assert_eq!(limiter.acquire(&cancel).await, Err(WaitCancelled));
        assert_abs_diff_eq!(limiter.tokens().await, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let limiter = RateLimiter::with_rate(1, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };

        advance(Duration::from_secs(1)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(WaitCancelled));
        // 1s elapsed at 0.1 tokens/s, nothing consumed by the cancelled waiter
        assert_abs_diff_eq!(limiter.tokens().await, 0.1, epsilon = 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_quota_waits_until_cancelled() {
        let limiter = RateLimiter::with_rate(0, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let waited = tokio::time::timeout(Duration::from_secs(3600), limiter.acquire(&cancel)).await;
        assert!(waited.is_err());

        cancel.cancel();
        assert_eq!(limiter.acquire(&cancel).await, Err(WaitCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_never_blocks() {
        let limiter = RateLimiter::with_rate(5, Duration::ZERO);
        let cancel = CancellationToken::new();

        for _ in 0..10 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert!(limiter.tokens().await <= 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clone_shares_bucket() {
        let limiter1 = RateLimiter::with_rate(3, Duration::from_secs(60));
        let limiter2 = limiter1.clone();
        let cancel = CancellationToken::new();

        limiter1.acquire(&cancel).await.unwrap();
        assert_eq!(limiter2.available().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_order() {
        let limiter = RateLimiter::with_rate(1, Duration::from_millis(100));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for id in 0..4 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.unwrap();
                order.lock().await.push(id);
            }));
            // Let this waiter queue on the bucket before spawning the next
            tokio::task::yield_now().await;
        }

        let start = Instant::now();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_millis(399));
    }
}
