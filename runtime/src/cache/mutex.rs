//! Mutex read: one loader per key, everyone else backs off and re-reads.

use super::{CacheGuard, Lookup};
use crate::metrics::CacheMetrics;
use crate::retry::RetryPolicy;
use seckill_core::providers::{CacheStore, Entity, EntityRepository};
use seckill_core::{Result, SeckillError};
use std::time::Duration;
use tracing::{debug, warn};

impl<T, S, R> CacheGuard<T, S, R>
where
    T: Entity,
    S: CacheStore + 'static,
    R: EntityRepository<T> + 'static,
{
    /// Read through the cache with a per-key rebuild lock.
    ///
    /// On a miss only the lock holder reads the store; the others sleep
    /// with jittered exponential backoff and retry the whole read, up to
    /// `lock_max_attempts` times. The lock is released on every exit,
    /// including cancellation of this future mid-load.
    ///
    /// # Errors
    ///
    /// - `CacheLockContention` when the attempts run out
    /// - `CoordinationStoreUnavailable` or `Database` if a backend fails
    pub async fn read_with_mutex(&self, id: T::Id) -> Result<Option<T>> {
        let key = self.cache_key(id);
        let lock_key = self.lock_key(id);
        let backoff = self.lock_backoff();
        let attempts = self.config.lock_max_attempts;

        for attempt in 0..attempts {
            match self.lookup(&key).await? {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Tombstone => return Ok(None),
                Lookup::Miss => {}
            }

            if let Some(lock) = self.try_lock(&lock_key).await? {
                let loaded = self.load_holding_lock(id, &key).await;
                lock.release().await;
                return loaded;
            }

            if attempt + 1 < attempts {
                let delay = backoff.jittered_delay(attempt);
                debug!(key = %lock_key, attempt, delay_ms = delay.as_millis(), "Rebuild lock held, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        CacheMetrics::record_lock_contention();
        warn!(key = %lock_key, attempts, "Gave up waiting for rebuild lock");
        Err(SeckillError::CacheLockContention { key: lock_key })
    }

    /// Another holder may have populated the key between our miss and our
    /// lock, so look again before going to the store.
    async fn load_holding_lock(&self, id: T::Id, key: &str) -> Result<Option<T>> {
        match self.lookup(key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Tombstone => Ok(None),
            Lookup::Miss => self.load_and_populate(id, key).await,
        }
    }

    fn lock_backoff(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.config.lock_max_attempts)
            .initial_delay(Duration::from_millis(self.config.lock_retry_initial_ms))
            .max_delay(Duration::from_millis(self.config.lock_retry_max_ms))
            .multiplier(2.0)
            .build()
    }
}
