//! Token bucket limiter with lazy refill.
//!
//! Tokens are replenished on each `allow` call from the elapsed time since
//! the last refill, so no background ticker is required. A single mutex per
//! limiter instance serializes admission across all keys; decisions are O(1),
//! so the serialization is acceptable at moderate request rates.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);

        if elapsed > Duration::from_millis(1) {
            let tokens_to_add = self.refill_rate * elapsed.as_secs_f64();
            self.tokens = (self.tokens + tokens_to_add).min(self.capacity as f64);
            self.last_refill = now;
        }
    }

    fn consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn available(&mut self) -> u32 {
        self.refill();
        self.tokens.floor() as u32
    }
}

/// Key→bucket limiter sharing one capacity/refill configuration.
pub struct TokenBucketLimiter {
    capacity: u32,
    refill_rate: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one token for `key`, creating a full bucket on first sight.
    /// Returns false when the bucket is empty.
    pub async fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_rate));
        bucket.consume()
    }

    /// Whole tokens currently available for `key`.
    pub async fn available(&self, key: &str) -> u32 {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(key) {
            Some(bucket) => bucket.available(),
            None => self.capacity,
        }
    }

    /// Restores `key` to a full bucket.
    pub async fn reset(&self, key: &str) {
        let mut buckets = self.buckets.lock().await;
        buckets.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn test_capacity_consumed_then_denied() {
        let limiter = TokenBucketLimiter::new(3, 0.0);

        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);
    }

    #[tokio::test]
    async fn test_lazy_refill_restores_tokens() {
        let limiter = TokenBucketLimiter::new(2, 500.0);

        assert!(limiter.allow("k").await);
        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);

        thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow("k").await);
    }

    #[tokio::test]
    async fn test_refill_capped_at_capacity() {
        let limiter = TokenBucketLimiter::new(5, 1000.0);

        limiter.allow("k").await;
        thread::sleep(Duration::from_millis(20));

        assert!(limiter.available("k").await <= 5);
        assert_eq!(limiter.available("k").await, 5);
    }

    #[tokio::test]
    async fn test_keys_have_independent_buckets() {
        let limiter = TokenBucketLimiter::new(1, 0.0);

        assert!(limiter.allow("a").await);
        assert!(!limiter.allow("a").await);
        assert!(limiter.allow("b").await);
    }

    #[tokio::test]
    async fn test_reset_refills_bucket() {
        let limiter = TokenBucketLimiter::new(1, 0.0);

        assert!(limiter.allow("k").await);
        assert!(!limiter.allow("k").await);

        limiter.reset("k").await;
        assert!(limiter.allow("k").await);
    }

    #[tokio::test]
    async fn test_unseen_key_reports_full_capacity() {
        let limiter = TokenBucketLimiter::new(7, 1.0);
        assert_eq!(limiter.available("fresh").await, 7);
    }
}
