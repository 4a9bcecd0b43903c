//! Redis `INCR` sequence counter.

use crate::{ConnectionManager, unavailable};
use redis::AsyncCommands;
use seckill_core::providers::SequenceCounter;
use seckill_core::{Result, SeckillError};

/// Redis-backed [`SequenceCounter`].
#[derive(Clone)]
pub struct RedisSequenceCounter {
    conn_manager: ConnectionManager,
}

impl RedisSequenceCounter {
    /// Create a counter over an existing connection.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

impl SequenceCounter for RedisSequenceCounter {
    async fn increment(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();

        let value: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| unavailable("increment sequence", &e))?;

        u64::try_from(value).map_err(|_| {
            SeckillError::CoordinationStoreUnavailable(format!(
                "Sequence {key} holds a negative value: {value}"
            ))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connect;

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn increments_from_one() {
        let counter = RedisSequenceCounter::new(connect("redis://127.0.0.1:6379").await.unwrap());
        let key = format!("inc:test:{}", rand::random::<u64>());

        assert_eq!(counter.increment(&key).await.unwrap(), 1);
        assert_eq!(counter.increment(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn drives_unique_order_ids() {
        use seckill_core::config::IdGeneratorConfig;
        use seckill_core::environment::SystemClock;
        use seckill_runtime::IdGenerator;
        use std::collections::HashSet;
        use std::sync::Arc;

        let counter = RedisSequenceCounter::new(connect("redis://127.0.0.1:6379").await.unwrap());
        let domain = format!("test{}", rand::random::<u32>());
        let ids = IdGenerator::new(
            Arc::new(counter),
            Arc::new(SystemClock),
            &IdGeneratorConfig::default(),
        );

        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(ids.next_id(&domain).await.unwrap()));
        }
    }
}
