//! Sequence counter backing the ID generator.

use crate::error::Result;

/// Atomic counter keyed by string.
pub trait SequenceCounter: Send + Sync {
    /// Increment `key` by one and return the new value (first call returns 1).
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the increment could not be
    /// performed. There is no local fallback.
    fn increment(&self, key: &str) -> impl std::future::Future<Output = Result<u64>> + Send;
}
