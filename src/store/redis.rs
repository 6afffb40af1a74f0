//! Redis-backed counter store.
//!
//! The shared-backend extension point: counters become `INCR`ed keys with an
//! `EXPIRE` matching the advisory window, so several gateway processes can
//! enforce one budget. Network errors propagate to the caller, which fails
//! closed per the [`CounterStore`](super::CounterStore) contract.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

use super::CounterStore;
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: MultiplexedConnection,
}

impl RedisCounterStore {
    /// Connects to the given Redis URL. The multiplexed connection is cheap
    /// to clone and shared by every limiter.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GatewayError::Store(format!("invalid redis url: {}", e)))?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn check_limit(&self, key: &str, limit: u32, _window_secs: u64) -> Result<bool> {
        let mut conn = self.connection.clone();
        let count: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(count.unwrap_or(0) < limit as u64)
    }

    async fn increment(&self, key: &str, window_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        let count: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

        // First write in this window sets the key's lifetime.
        if count == 1 && window_secs > 0 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(())
    }

    async fn usage(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let count: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(count.unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL").arg(key).query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
