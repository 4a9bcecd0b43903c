//! Point-lookup repository for entities served through the cache guard.

use crate::error::Result;
use crate::types::{Shop, ShopId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;

/// An entity with a stable id that can be cached as JSON.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identifier type.
    type Id: Copy + Display + Send + Sync + 'static;

    /// This entity's id.
    fn id(&self) -> Self::Id;
}

impl Entity for Shop {
    type Id = ShopId;

    fn id(&self) -> ShopId {
        self.id
    }
}

/// Persistent store for an entity type.
pub trait EntityRepository<T: Entity>: Send + Sync {
    /// Load by id.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn find_by_id(&self, id: T::Id) -> impl std::future::Future<Output = Result<Option<T>>> + Send;

    /// Persist changes to an existing entity.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the write fails, `InvalidInput` if the entity
    /// does not exist.
    fn update(&self, entity: &T) -> impl std::future::Future<Output = Result<()>> + Send;
}
