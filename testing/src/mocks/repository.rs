//! In-memory entity repository that counts its loads.

use seckill_core::providers::{Entity, EntityRepository};
use seckill_core::{Result, SeckillError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Repository backed by a map, with an optional per-load delay to widen
/// race windows in cache tests.
#[derive(Debug)]
pub struct InMemoryEntityRepository<T: Entity> {
    entities: Mutex<HashMap<String, T>>,
    loads: AtomicUsize,
    load_delay: Duration,
}

impl<T: Entity> Default for InMemoryEntityRepository<T> {
    fn default() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
        }
    }
}

impl<T: Entity> InMemoryEntityRepository<T> {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long on every load.
    #[must_use]
    pub const fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Insert or replace an entity directly.
    pub fn insert(&self, entity: T) {
        if let Ok(mut entities) = self.entities.lock() {
            entities.insert(entity.id().to_string(), entity);
        }
    }

    /// Delete an entity directly.
    pub fn remove(&self, id: T::Id) {
        if let Ok(mut entities) = self.entities.lock() {
            entities.remove(&id.to_string());
        }
    }

    /// Number of `find_by_id` calls so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Current stored value, without counting a load.
    #[must_use]
    pub fn get(&self, id: T::Id) -> Option<T> {
        self.entities
            .lock()
            .ok()
            .and_then(|entities| entities.get(&id.to_string()).cloned())
    }
}

impl<T: Entity> EntityRepository<T> for InMemoryEntityRepository<T> {
    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let entities = self
            .entities
            .lock()
            .map_err(|_| SeckillError::Database("repository mutex poisoned".to_string()))?;
        Ok(entities.get(&id.to_string()).cloned())
    }

    async fn update(&self, entity: &T) -> Result<()> {
        let mut entities = self
            .entities
            .lock()
            .map_err(|_| SeckillError::Database("repository mutex poisoned".to_string()))?;
        let key = entity.id().to_string();
        if !entities.contains_key(&key) {
            return Err(SeckillError::InvalidInput(format!("entity {key} does not exist")));
        }
        entities.insert(key, entity.clone());
        Ok(())
    }
}
