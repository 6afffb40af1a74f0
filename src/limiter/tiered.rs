//! Three-tier fixed-window limiter.
//!
//! Every admitted request is charged against three independent windows:
//! minute, daily, and burst (one second). Checks run in that order and
//! short-circuit on the first exceeded tier; counters are incremented only
//! after all tiers pass, so a rejected request never leaves a partial charge.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::Strategy;
use crate::error::{GatewayError, Result};
use crate::store::CounterStore;

const MINUTE_WINDOW_SECS: u64 = 60;
const DAILY_WINDOW_SECS: u64 = 86_400;
const BURST_WINDOW_SECS: u64 = 1;

/// Per-identifier counts across the three windows.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierUsage {
    pub minute: u64,
    pub daily: u64,
    pub burst: u64,
}

pub struct TieredLimiter {
    store: Arc<dyn CounterStore>,
    // Serializes the check phase against the increment phase so two
    // concurrent requests for the same identifier cannot both pass a
    // nearly-exhausted tier.
    admission: Mutex<()>,
}

impl TieredLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            admission: Mutex::new(()),
        }
    }

    fn minute_key(identifier: &str) -> String {
        format!("rate:minute:{}", identifier)
    }

    fn daily_key(identifier: &str) -> String {
        format!("rate:daily:{}", identifier)
    }

    fn burst_key(identifier: &str) -> String {
        format!("rate:burst:{}", identifier)
    }

    /// Admits or rejects one request for `identifier` under `strategy`.
    ///
    /// All three tiers are checked read-only first; increments happen only
    /// once every tier passes. A store failure rejects the request (fail
    /// closed) by propagating [`GatewayError::Store`].
    pub async fn admit(&self, identifier: &str, strategy: Strategy) -> Result<()> {
        let _guard = self.admission.lock().await;

        let minute_key = Self::minute_key(identifier);
        let daily_key = Self::daily_key(identifier);
        let burst_key = Self::burst_key(identifier);

        if !self
            .store
            .check_limit(&minute_key, strategy.rate, MINUTE_WINDOW_SECS)
            .await?
        {
            debug!(identifier, limit = strategy.rate, "minute window exceeded");
            return Err(GatewayError::RateLimited {
                window: "minute",
                limit: strategy.rate,
            });
        }

        if !self
            .store
            .check_limit(&daily_key, strategy.daily, DAILY_WINDOW_SECS)
            .await?
        {
            debug!(identifier, limit = strategy.daily, "daily window exceeded");
            return Err(GatewayError::RateLimited {
                window: "daily",
                limit: strategy.daily,
            });
        }

        // burst == 0 disables the burst tier.
        if strategy.burst > 0
            && !self
                .store
                .check_limit(&burst_key, strategy.burst, BURST_WINDOW_SECS)
                .await?
        {
            debug!(identifier, limit = strategy.burst, "burst window exceeded");
            return Err(GatewayError::RateLimited {
                window: "burst",
                limit: strategy.burst,
            });
        }

        self.store.increment(&minute_key, MINUTE_WINDOW_SECS).await?;
        self.store.increment(&daily_key, DAILY_WINDOW_SECS).await?;
        if strategy.burst > 0 {
            self.store.increment(&burst_key, BURST_WINDOW_SECS).await?;
        }

        Ok(())
    }

    /// Current counts for all three windows.
    pub async fn usage(&self, identifier: &str) -> Result<TierUsage> {
        Ok(TierUsage {
            minute: self.store.usage(&Self::minute_key(identifier)).await?,
            daily: self.store.usage(&Self::daily_key(identifier)).await?,
            burst: self.store.usage(&Self::burst_key(identifier)).await?,
        })
    }

    /// Clears all three windows for `identifier`. The resets are sequential;
    /// the windows are independent keys, so no cross-window transaction is
    /// needed.
    pub async fn reset(&self, identifier: &str) -> Result<()> {
        self.store.reset(&Self::minute_key(identifier)).await?;
        self.store.reset(&Self::daily_key(identifier)).await?;
        self.store.reset(&Self::burst_key(identifier)).await?;
        Ok(())
    }
}
