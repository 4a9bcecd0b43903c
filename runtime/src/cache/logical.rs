//! Logical-expiry read: entries never expire physically; readers serve what
//! is there and a bounded pool refreshes stale entries in the background.

use super::CacheGuard;
use crate::metrics::CacheMetrics;
use chrono::{DateTime, Utc};
use seckill_core::providers::{CacheStore, Entity, EntityRepository};
use seckill_core::{Result, SeckillError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cached payload with an embedded expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalEnvelope<T> {
    /// Cached entity.
    pub data: T,
    /// When the entry should be refreshed.
    pub expire_at: DateTime<Utc>,
}

impl<T> LogicalEnvelope<T> {
    /// Whether the entry is still fresh at `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at > now
    }
}

impl<T, S, R> CacheGuard<T, S, R>
where
    T: Entity,
    S: CacheStore + 'static,
    R: EntityRepository<T> + 'static,
{
    /// Read a pre-warmed entry without ever blocking on the store.
    ///
    /// - miss → `None` (hot keys are warmed ahead of time with [`warm`](Self::warm))
    /// - fresh → the value
    /// - expired → the stale value; if this caller wins the rebuild lock a
    ///   background task reloads the entry
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the cache cannot be read.
    pub async fn read_with_logical_expiry(&self, id: T::Id) -> Result<Option<T>> {
        let key = self.cache_key(id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let envelope: LogicalEnvelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable logical cache entry, scheduling rebuild");
                self.schedule_rebuild(id).await?;
                return Ok(None);
            }
        };

        if envelope.is_fresh_at(self.clock.now()) {
            CacheMetrics::record_hit();
            return Ok(Some(envelope.data));
        }

        self.schedule_rebuild(id).await?;
        Ok(Some(envelope.data))
    }

    /// Load `id` from the store and write it with a logical expiry of
    /// `logical_ttl` from now.
    ///
    /// Returns the loaded entity; nothing is written if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Database` or `CoordinationStoreUnavailable` if a backend fails.
    pub async fn warm(&self, id: T::Id, logical_ttl: Duration) -> Result<Option<T>> {
        let Some(data) = self.repository.find_by_id(id).await? else {
            debug!(id = %id, "Nothing to warm, entity not found");
            return Ok(None);
        };

        let ttl = chrono::Duration::from_std(logical_ttl)
            .map_err(|e| SeckillError::InvalidInput(format!("logical ttl out of range: {e}")))?;
        let envelope = LogicalEnvelope {
            data,
            expire_at: self.clock.now() + ttl,
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| SeckillError::Serialization(e.to_string()))?;
        self.store.set(&self.cache_key(id), &payload).await?;
        Ok(Some(envelope.data))
    }

    /// Start a background rebuild if nobody else holds the lock.
    async fn schedule_rebuild(&self, id: T::Id) -> Result<()> {
        let Some(lock) = self.try_lock(&self.lock_key(id)).await? else {
            return Ok(());
        };

        CacheMetrics::record_rebuild();
        let guard = self.clone();
        let pool = Arc::clone(&self.rebuild_pool);
        tokio::spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                lock.release().await;
                return;
            };
            match guard.rebuild(id).await {
                Ok(true) => info!(id = %id, "Logical cache entry rebuilt"),
                Ok(false) => info!(id = %id, "Entity gone, logical cache entry dropped"),
                Err(e) => warn!(id = %id, error = %e, "Logical cache rebuild failed"),
            }
            lock.release().await;
        });
        Ok(())
    }

    /// Reload one entry. Returns `false` if the entity no longer exists, in
    /// which case the stale entry is deleted so readers see a plain miss.
    async fn rebuild(&self, id: T::Id) -> Result<bool> {
        if self.warm(id, self.config.logical_ttl()).await?.is_some() {
            return Ok(true);
        }
        self.store.delete(&self.cache_key(id)).await?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn envelope_freshness_is_strict() {
        let Some(at) = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single() else {
            return;
        };
        let envelope = LogicalEnvelope { data: 1, expire_at: at };
        assert!(envelope.is_fresh_at(at - chrono::Duration::seconds(1)));
        assert!(!envelope.is_fresh_at(at));
    }
}
