//! # Seckill Redis
//!
//! Coordination-store providers backed by Redis:
//!
//! - [`RedisStockGate`]: the atomic stock/idempotency gate (Lua script)
//! - [`RedisSequenceCounter`]: `INCR` counters for the ID generator
//! - [`RedisCacheStore`]: strings with TTL and `SET NX` locks for the cache guard
//!
//! All three share one multiplexed [`ConnectionManager`]; clone it into each.
//!
//! ```no_run
//! use seckill_redis::{RedisCacheStore, RedisSequenceCounter, RedisStockGate, connect};
//!
//! # async fn example() -> seckill_core::Result<()> {
//! let conn = connect("redis://127.0.0.1:6379").await?;
//! let gate = RedisStockGate::new(conn.clone());
//! let counter = RedisSequenceCounter::new(conn.clone());
//! let cache = RedisCacheStore::new(conn);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod cache;
mod counter;
mod gate;

pub use cache::RedisCacheStore;
pub use counter::RedisSequenceCounter;
pub use gate::RedisStockGate;
pub use redis::aio::ConnectionManager;

use redis::Client;
use seckill_core::{Result, SeckillError};

/// Open a reconnecting connection to `redis_url`.
///
/// # Errors
///
/// Returns `CoordinationStoreUnavailable` if the URL is invalid or the first
/// connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url).map_err(|e| {
        SeckillError::CoordinationStoreUnavailable(format!("Failed to create Redis client: {e}"))
    })?;

    let conn = ConnectionManager::new(client).await.map_err(|e| {
        SeckillError::CoordinationStoreUnavailable(format!(
            "Failed to create Redis connection manager: {e}"
        ))
    })?;

    tracing::info!("Connected to Redis");
    Ok(conn)
}

pub(crate) fn unavailable(action: &str, e: &redis::RedisError) -> SeckillError {
    SeckillError::CoordinationStoreUnavailable(format!("Failed to {action}: {e}"))
}
