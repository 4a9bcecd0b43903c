//! Key/value cache operations used by the cache guard.

use crate::error::Result;
use std::time::Duration;

/// String key/value cache with TTLs and set-if-absent.
///
/// Errors from every method are `CoordinationStoreUnavailable`.
pub trait CacheStore: Send + Sync {
    /// Read a key. `Some("")` is a stored empty string, distinct from a miss.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a key with a physical TTL.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a key with no TTL.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn set(&self, key: &str, value: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write a key only if it does not exist.
    ///
    /// # Returns
    ///
    /// `true` if this call created the key.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}
