//! In-memory reference implementation of the counter store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CounterStore;
use crate::error::Result;

/// Process-local counter store.
///
/// Counters live until explicitly reset; the advisory window parameter is
/// ignored. All operations are O(1) map lookups under a single RwLock.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, u64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters, exported as the `rate_limit_active_keys`
    /// gauge by the background stats task.
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn check_limit(&self, key: &str, limit: u32, _window_secs: u64) -> Result<bool> {
        let counters = self.counters.read().await;
        let count = counters.get(key).copied().unwrap_or(0);
        Ok(count < limit as u64)
    }

    async fn increment(&self, key: &str, _window_secs: u64) -> Result<()> {
        let mut counters = self.counters.write().await;
        *counters.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn usage(&self, key: &str) -> Result<u64> {
        let counters = self.counters.read().await;
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut counters = self.counters.write().await;
        counters.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_usage_tracks_sequential_increments() {
        let store = MemoryCounterStore::new();

        for _ in 0..7 {
            store.increment("k", 60).await.unwrap();
        }

        assert_eq!(store.usage("k").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_check_limit_boundary() {
        let store = MemoryCounterStore::new();
        let limit = 5;

        for _ in 0..limit - 1 {
            store.increment("k", 60).await.unwrap();
        }
        assert!(store.check_limit("k", limit, 60).await.unwrap());

        store.increment("k", 60).await.unwrap();
        assert!(!store.check_limit("k", limit, 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_deletes_counter() {
        let store = MemoryCounterStore::new();

        store.increment("k", 60).await.unwrap();
        store.reset("k").await.unwrap();

        assert_eq!(store.usage("k").await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_key_reads_as_zero() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.usage("missing").await.unwrap(), 0);
        assert!(store.check_limit("missing", 1, 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryCounterStore::new();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("shared", 60).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.usage("shared").await.unwrap(), 50);
    }
}
