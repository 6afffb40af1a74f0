//! Sub-bucketed sliding window limiter.
//!
//! The window is split into fixed sub-buckets stored as individual counters.
//! A check sums the buckets covering the window, weighting the oldest bucket
//! by how much of it still overlaps the window. This smooths the boundary
//! burst a plain fixed window allows (double the budget across a reset).
//!
//! The in-memory reference store never expires keys, so the limiter tracks
//! the last bucket charged per key and sweeps every bucket that slid past
//! the window since then. Sweeps are bounded: live data only ever spans the
//! last [`SUB_BUCKETS`] indices before the marker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::CounterStore;

const SUB_BUCKETS: u64 = 10;

pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    limit: u32,
    window_secs: u64,
    bucket_secs: u64,
    // Highest bucket index that may still hold data, per key.
    last_bucket: Mutex<HashMap<String, u64>>,
}

impl SlidingWindowLimiter {
    /// `window_secs` must be at least [`SUB_BUCKETS`] seconds so each bucket
    /// spans a whole second; shorter windows round the bucket up to 1s.
    pub fn new(store: Arc<dyn CounterStore>, limit: u32, window_secs: u64) -> Self {
        let bucket_secs = (window_secs / SUB_BUCKETS).max(1);
        Self {
            store,
            limit,
            window_secs,
            bucket_secs,
            last_bucket: Mutex::new(HashMap::new()),
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn bucket_key(key: &str, index: u64) -> String {
        format!("{}:slide:{}", key, index)
    }

    /// Weighted request count over the window ending at `now_secs`.
    async fn weighted_count(&self, key: &str, now_secs: u64) -> Result<f64> {
        let current = now_secs / self.bucket_secs;
        let oldest = current.saturating_sub(SUB_BUCKETS);

        let mut total = 0.0;
        for index in oldest..=current {
            let count = self.store.usage(&Self::bucket_key(key, index)).await? as f64;
            if index == oldest {
                // The oldest bucket only partially overlaps the window.
                let elapsed_in_current = (now_secs % self.bucket_secs) as f64;
                let overlap = 1.0 - elapsed_in_current / self.bucket_secs as f64;
                total += count * overlap;
            } else {
                total += count;
            }
        }

        Ok(total)
    }

    /// Deletes every bucket that has slid out of the window since the last
    /// call for `key`, then advances the marker to `current`. After a long
    /// idle gap this clears the whole stale span, not just one bucket.
    async fn sweep_expired(&self, key: &str, current: u64) -> Result<()> {
        let prev = {
            let mut markers = self.last_bucket.lock().await;
            markers.insert(key.to_string(), current)
        };

        let Some(prev) = prev else {
            return Ok(());
        };
        let Some(horizon) = current.checked_sub(SUB_BUCKETS + 1) else {
            return Ok(());
        };

        // Data can only live in [prev - SUB_BUCKETS, prev]; everything in
        // that span at or below the horizon is expired.
        let start = prev.saturating_sub(SUB_BUCKETS);
        let end = horizon.min(prev);
        for index in start..=end {
            self.store.reset(&Self::bucket_key(key, index)).await?;
        }

        Ok(())
    }

    async fn allow_at(&self, key: &str, now_secs: u64) -> Result<bool> {
        let current = now_secs / self.bucket_secs;
        self.sweep_expired(key, current).await?;

        if self.weighted_count(key, now_secs).await? >= self.limit as f64 {
            return Ok(false);
        }

        self.store
            .increment(&Self::bucket_key(key, current), self.window_secs)
            .await?;

        Ok(true)
    }

    /// Admits the request if the weighted window count is below the limit,
    /// charging the current sub-bucket on admission.
    pub async fn allow(&self, key: &str) -> Result<bool> {
        self.allow_at(key, Self::now_secs()).await
    }

    /// Weighted count currently held against `key`.
    pub async fn usage(&self, key: &str) -> Result<f64> {
        self.weighted_count(key, Self::now_secs()).await
    }

    /// Clears every bucket that may hold data for `key` and forgets its
    /// marker.
    pub async fn reset(&self, key: &str) -> Result<()> {
        let marker = {
            let mut markers = self.last_bucket.lock().await;
            markers.remove(key)
        };

        let current = Self::now_secs() / self.bucket_secs;
        let newest = marker.map_or(current, |m| m.max(current));
        let oldest = marker
            .map_or(current, |m| m.min(current))
            .saturating_sub(SUB_BUCKETS);
        for index in oldest..=newest {
            self.store.reset(&Self::bucket_key(key, index)).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;

    fn limiter(limit: u32, window_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(Arc::new(MemoryCounterStore::new()), limit, window_secs)
    }

    #[tokio::test]
    async fn test_limit_enforced_within_single_bucket() {
        let limiter = limiter(3, 60);
        let now = 1_000_000;

        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(!limiter.allow_at("k", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_spans_bucket_boundary() {
        let limiter = limiter(3, 60);
        // bucket_secs = 6; fill the budget, then cross into the next bucket.
        let now = 1_000_002;

        for _ in 0..3 {
            assert!(limiter.allow_at("k", now).await.unwrap());
        }

        // Next bucket, still inside the window: earlier requests still count.
        assert!(!limiter.allow_at("k", now + 6).await.unwrap());
    }

    #[tokio::test]
    async fn test_old_requests_slide_out() {
        let limiter = limiter(2, 60);
        let now = 1_000_000;

        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(!limiter.allow_at("k", now).await.unwrap());

        // A full window later the old buckets no longer contribute.
        assert!(limiter.allow_at("k", now + 61).await.unwrap());
    }

    #[tokio::test]
    async fn test_oldest_bucket_weighted_by_overlap() {
        let limiter = limiter(10, 60);
        // bucket_secs = 6. Land 6 requests at a bucket start.
        let start = 999_996; // divisible by 6
        for _ in 0..6 {
            assert!(limiter.allow_at("k", start).await.unwrap());
        }

        // 63s later that bucket is the oldest, half slid out: weight 0.5.
        let usage = limiter.weighted_count("k", start + 60 + 3).await.unwrap();
        assert!((usage - 3.0).abs() < 1e-9, "usage = {}", usage);
    }

    #[tokio::test]
    async fn test_idle_gap_sweeps_stale_buckets() {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = SlidingWindowLimiter::new(store.clone(), 5, 60);

        // Two admissions in adjacent buckets, then a long idle gap.
        let now = 1_000_002;
        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(limiter.allow_at("k", now + 6).await.unwrap());
        assert_eq!(store.len().await, 2);

        // The next admission sweeps both stale buckets, leaving only the
        // freshly charged one in the store.
        assert!(limiter.allow_at("k", now + 600).await.unwrap());
        assert_eq!(store.len().await, 1);

        let usage = limiter.weighted_count("k", now + 600).await.unwrap();
        assert!((usage - 1.0).abs() < 1e-9, "usage = {}", usage);
    }

    #[tokio::test]
    async fn test_sweep_preserves_in_window_counts() {
        let limiter = limiter(3, 60);
        let now = 1_000_002;

        assert!(limiter.allow_at("k", now).await.unwrap());
        assert!(limiter.allow_at("k", now).await.unwrap());

        // 30s later the earlier bucket is still inside the window and must
        // survive the sweep.
        assert!(limiter.allow_at("k", now + 30).await.unwrap());
        assert!(!limiter.allow_at("k", now + 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_clears_window() {
        let limiter = limiter(1, 60);

        assert!(limiter.allow("k").await.unwrap());
        assert!(!limiter.allow("k").await.unwrap());

        limiter.reset("k").await.unwrap();
        assert!(limiter.allow("k").await.unwrap());
    }
}
