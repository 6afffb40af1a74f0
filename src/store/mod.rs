//! Counter store abstraction.
//!
//! Every limiter in this crate counts through the [`CounterStore`] trait so
//! the backend can be swapped (in-memory for a single process, Redis for a
//! shared deployment) without touching admission logic.

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;

pub use memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Pluggable key→counter backend with bounded-window semantics.
///
/// `window_secs` is advisory: a remote backend expires the key after that
/// duration, while the in-memory reference keeps counters until an explicit
/// `reset`. Callers must treat any `Err` as a rejection — on backend failure
/// the rate-limit guarantee is preserved by failing closed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Returns true if the current count for `key` is strictly below `limit`.
    /// Does not mutate.
    async fn check_limit(&self, key: &str, limit: u32, window_secs: u64) -> Result<bool>;

    /// Increments the count for `key` by 1.
    async fn increment(&self, key: &str, window_secs: u64) -> Result<()>;

    /// Current count for `key`, 0 if absent.
    async fn usage(&self, key: &str) -> Result<u64>;

    /// Deletes the counter for `key`.
    async fn reset(&self, key: &str) -> Result<()>;
}
