//! Cache guard: read-through caching that shields the persistent store.
//!
//! Three read strategies over the same key space:
//!
//! | Method | Miss behaviour | Protects against |
//! |--------|----------------|------------------|
//! | [`CacheGuard::read`] | load, populate (tombstone if absent) | penetration |
//! | [`CacheGuard::read_with_mutex`] | one loader per key, others back off | penetration + breakdown |
//! | [`CacheGuard::read_with_logical_expiry`] | stale value served, rebuild in background | breakdown, never blocks |
//!
//! Writes go to the store first and then delete the cache entry
//! ([`CacheGuard::update`]).
//!
//! A tombstone is the empty string. Payloads are JSON; a payload that fails
//! to decode is treated as a miss and overwritten on the next load.

mod logical;
mod mutex;

use crate::metrics::CacheMetrics;
use seckill_core::config::CacheConfig;
use seckill_core::environment::Clock;
use seckill_core::keys::{SHOP_CACHE_PREFIX, SHOP_LOCK_PREFIX};
use seckill_core::providers::{CacheStore, Entity, EntityRepository};
use seckill_core::{Result, SeckillError, Shop};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub use logical::LogicalEnvelope;

const TOMBSTONE: &str = "";

/// What the cache holds for a key.
enum Lookup<T> {
    Hit(T),
    Tombstone,
    Miss,
}

/// Read-through cache for one entity type.
pub struct CacheGuard<T, S, R> {
    store: Arc<S>,
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    key_prefix: String,
    lock_prefix: String,
    rebuild_pool: Arc<Semaphore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S, R> Clone for CacheGuard<T, S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            key_prefix: self.key_prefix.clone(),
            lock_prefix: self.lock_prefix.clone(),
            rebuild_pool: Arc::clone(&self.rebuild_pool),
            _entity: PhantomData,
        }
    }
}

impl<S, R> CacheGuard<Shop, S, R>
where
    S: CacheStore + 'static,
    R: EntityRepository<Shop> + 'static,
{
    /// Guard for shops under `cache:shop:` / `lock:shop:`.
    #[must_use]
    pub fn for_shops(
        store: Arc<S>,
        repository: Arc<R>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self::new(store, repository, clock, config, SHOP_CACHE_PREFIX, SHOP_LOCK_PREFIX)
    }
}

impl<T, S, R> CacheGuard<T, S, R>
where
    T: Entity,
    S: CacheStore + 'static,
    R: EntityRepository<T> + 'static,
{
    /// Create a guard. Cache keys are `key_prefix + id`, lock keys
    /// `lock_prefix + id`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        repository: Arc<R>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
        key_prefix: impl Into<String>,
        lock_prefix: impl Into<String>,
    ) -> Self {
        let rebuild_pool = Arc::new(Semaphore::new(config.rebuild_workers.max(1)));
        Self {
            store,
            repository,
            clock,
            config,
            key_prefix: key_prefix.into(),
            lock_prefix: lock_prefix.into(),
            rebuild_pool,
            _entity: PhantomData,
        }
    }

    /// Read through the cache, caching "not found" as a tombstone.
    ///
    /// No concurrency bound: N concurrent misses on one key make N store
    /// loads. Use [`read_with_mutex`](Self::read_with_mutex) when a key can
    /// be hot before it is cached.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` or `Database` if either
    /// backend fails.
    pub async fn read(&self, id: T::Id) -> Result<Option<T>> {
        let key = self.cache_key(id);
        match self.lookup(&key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Tombstone => Ok(None),
            Lookup::Miss => self.load_and_populate(id, &key).await,
        }
    }

    /// Write the entity to the store, then drop its cache entry.
    ///
    /// # Errors
    ///
    /// Returns the store error without touching the cache, or
    /// `CoordinationStoreUnavailable` if the delete fails.
    pub async fn update(&self, entity: &T) -> Result<()> {
        self.repository.update(entity).await?;
        self.invalidate(entity.id()).await
    }

    /// Drop the cache entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the delete fails.
    pub async fn invalidate(&self, id: T::Id) -> Result<()> {
        let key = self.cache_key(id);
        self.store.delete(&key).await?;
        debug!(key = %key, "Cache entry invalidated");
        Ok(())
    }

    fn cache_key(&self, id: T::Id) -> String {
        format!("{}{id}", self.key_prefix)
    }

    fn lock_key(&self, id: T::Id) -> String {
        format!("{}{id}", self.lock_prefix)
    }

    async fn lookup(&self, key: &str) -> Result<Lookup<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Lookup::Miss);
        };
        if raw == TOMBSTONE {
            CacheMetrics::record_tombstone();
            return Ok(Lookup::Tombstone);
        }
        match serde_json::from_str(&raw) {
            Ok(value) => {
                CacheMetrics::record_hit();
                Ok(Lookup::Hit(value))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable cache payload, treating as miss");
                Ok(Lookup::Miss)
            }
        }
    }

    async fn load_and_populate(&self, id: T::Id, key: &str) -> Result<Option<T>> {
        CacheMetrics::record_miss();
        match self.repository.find_by_id(id).await? {
            Some(value) => {
                let payload = serde_json::to_string(&value)
                    .map_err(|e| SeckillError::Serialization(e.to_string()))?;
                self.store.set_with_ttl(key, &payload, self.config.ttl()).await?;
                Ok(Some(value))
            }
            None => {
                self.store
                    .set_with_ttl(key, TOMBSTONE, self.config.null_ttl())
                    .await?;
                debug!(key = %key, "Cached tombstone for missing entity");
                Ok(None)
            }
        }
    }

    async fn try_lock(&self, lock_key: &str) -> Result<Option<RebuildLock<S>>> {
        let acquired = self
            .store
            .set_if_absent(lock_key, "1", self.config.lock_ttl())
            .await?;
        Ok(acquired.then(|| RebuildLock {
            store: Arc::clone(&self.store),
            key: Some(lock_key.to_string()),
        }))
    }
}

/// A held rebuild lock.
///
/// Released by [`release`](Self::release) or, if the holder is dropped
/// first (a cancelled read, an aborted rebuild), by a delete spawned from
/// `Drop`.
struct RebuildLock<S: CacheStore + 'static> {
    store: Arc<S>,
    key: Option<String>,
}

impl<S: CacheStore + 'static> RebuildLock<S> {
    async fn release(mut self) {
        if let Some(key) = self.key.take() {
            delete_lock(self.store.as_ref(), &key).await;
        }
    }
}

impl<S: CacheStore + 'static> Drop for RebuildLock<S> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    delete_lock(store.as_ref(), &key).await;
                });
            }
            Err(_) => warn!(key = %key, "No runtime to release rebuild lock, left to expire"),
        }
    }
}

/// Lock leases expire on their own, so a failed delete is only logged.
async fn delete_lock<S: CacheStore>(store: &S, key: &str) {
    match store.delete(key).await {
        Ok(()) => debug!(key = %key, "Rebuild lock released"),
        Err(e) => warn!(key = %key, error = %e, "Failed to release rebuild lock"),
    }
}
