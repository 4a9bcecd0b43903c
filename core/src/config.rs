//! Typed configuration for the pipeline components.
//!
//! Every struct has production defaults; [`SeckillConfig::validate`] checks
//! the whole tree before any component is built.

use crate::error::{Result, SeckillError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
const fn duration_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

/// Admission controller (token bucket) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Permits refilled per second.
    pub permits_per_second: f64,
    /// Bucket capacity. `None` stores one second's worth of permits.
    pub burst_capacity: Option<f64>,
    /// How long a purchase may wait for a permit, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl AdmissionConfig {
    /// Set the refill rate.
    #[must_use]
    pub const fn with_permits_per_second(mut self, permits_per_second: f64) -> Self {
        self.permits_per_second = permits_per_second;
        self
    }

    /// Set the bucket capacity.
    #[must_use]
    pub const fn with_burst_capacity(mut self, capacity: f64) -> Self {
        self.burst_capacity = Some(capacity);
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = duration_millis(timeout);
        self
    }

    /// Effective bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.burst_capacity.unwrap_or(self.permits_per_second).max(1.0)
    }

    /// Acquire timeout as a `Duration`.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Validate admission settings.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::InvalidInput`] for a non-positive rate or capacity.
    pub fn validate(&self) -> Result<()> {
        if !(self.permits_per_second.is_finite() && self.permits_per_second > 0.0) {
            return Err(SeckillError::InvalidInput(
                "permits_per_second must be > 0".to_string(),
            ));
        }
        if self
            .burst_capacity
            .is_some_and(|capacity| !(capacity.is_finite() && capacity >= 1.0))
        {
            return Err(SeckillError::InvalidInput(
                "burst_capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            permits_per_second: 10.0,
            burst_capacity: None,
            acquire_timeout_ms: 1000,
        }
    }
}

/// Cache guard settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for real cached values, in milliseconds.
    pub ttl_ms: u64,
    /// TTL for tombstones (cached "not found"), in milliseconds.
    pub null_ttl_ms: u64,
    /// Rebuild lock lease, in milliseconds.
    pub lock_ttl_ms: u64,
    /// Logical expiry written by background rebuilds, in milliseconds.
    pub logical_ttl_ms: u64,
    /// First wait between lock attempts, in milliseconds.
    pub lock_retry_initial_ms: u64,
    /// Upper bound on a single wait, in milliseconds.
    pub lock_retry_max_ms: u64,
    /// Lock attempts before giving up with `CacheLockContention`.
    pub lock_max_attempts: usize,
    /// Background rebuild workers for the logical-expiry variant.
    pub rebuild_workers: usize,
}

impl CacheConfig {
    /// Set the value and tombstone TTLs.
    #[must_use]
    pub const fn with_ttls(mut self, ttl: Duration, null_ttl: Duration) -> Self {
        self.ttl_ms = duration_millis(ttl);
        self.null_ttl_ms = duration_millis(null_ttl);
        self
    }

    /// Set the rebuild lock lease.
    #[must_use]
    pub const fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_ms = duration_millis(ttl);
        self
    }

    /// Set the lock retry budget.
    #[must_use]
    pub const fn with_lock_retry(mut self, max_attempts: usize, initial: Duration) -> Self {
        self.lock_max_attempts = max_attempts;
        self.lock_retry_initial_ms = duration_millis(initial);
        self
    }

    /// Set the logical expiry written by rebuilds.
    #[must_use]
    pub const fn with_logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl_ms = duration_millis(ttl);
        self
    }

    /// Set the logical-expiry rebuild pool size.
    #[must_use]
    pub const fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    /// Value TTL as a `Duration`.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Tombstone TTL as a `Duration`.
    #[must_use]
    pub const fn null_ttl(&self) -> Duration {
        Duration::from_millis(self.null_ttl_ms)
    }

    /// Logical expiry as a `Duration`.
    #[must_use]
    pub const fn logical_ttl(&self) -> Duration {
        Duration::from_millis(self.logical_ttl_ms)
    }

    /// Lock lease as a `Duration`.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Validate cache settings.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::InvalidInput`] for zero TTLs, attempts or workers.
    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms == 0
            || self.null_ttl_ms == 0
            || self.lock_ttl_ms == 0
            || self.logical_ttl_ms == 0
        {
            return Err(SeckillError::InvalidInput("cache TTLs must be > 0".to_string()));
        }
        if self.lock_max_attempts == 0 {
            return Err(SeckillError::InvalidInput(
                "lock_max_attempts must be > 0".to_string(),
            ));
        }
        if self.rebuild_workers == 0 {
            return Err(SeckillError::InvalidInput(
                "rebuild_workers must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30 * 60 * 1000,
            null_ttl_ms: 2 * 60 * 1000,
            lock_ttl_ms: 10 * 1000,
            logical_ttl_ms: 30 * 60 * 1000,
            lock_retry_initial_ms: 50,
            lock_retry_max_ms: 500,
            lock_max_attempts: 20,
            rebuild_workers: 10,
        }
    }
}

/// Distributed ID generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGeneratorConfig {
    /// Fixed epoch, seconds since the Unix epoch (2022-01-01T00:00:00Z).
    pub epoch_secs: i64,
    /// Domain used for order ids.
    pub order_domain: String,
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self {
            epoch_secs: 1_640_995_200,
            order_domain: "order".to_string(),
        }
    }
}

/// Order materializer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializerConfig {
    /// Retries for transient store failures.
    pub max_retries: usize,
    /// First backoff, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Remove the buyer from the gate's set when the store refuses the order,
    /// so the user may try again. Stock is not refunded.
    pub release_user_on_conflict: bool,
}

impl MaterializerConfig {
    /// Set the transient-failure retry budget.
    #[must_use]
    pub const fn with_retries(mut self, max_retries: usize, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = duration_millis(initial_backoff);
        self
    }

    /// Choose whether a conflict frees the buyer's gate slot.
    #[must_use]
    pub const fn with_release_user_on_conflict(mut self, release: bool) -> Self {
        self.release_user_on_conflict = release;
        self
    }

    /// First backoff as a `Duration`.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            release_user_on_conflict: true,
        }
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeckillConfig {
    /// Admission controller.
    pub admission: AdmissionConfig,
    /// Cache guard.
    pub cache: CacheConfig,
    /// ID generator.
    pub ids: IdGeneratorConfig,
    /// Order materializer.
    pub materializer: MaterializerConfig,
}

impl SeckillConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section error found.
    pub fn validate(&self) -> Result<()> {
        self.admission.validate()?;
        self.cache.validate()?;
        if self.ids.order_domain.is_empty() {
            return Err(SeckillError::InvalidInput("order_domain must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SeckillConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.admission.capacity() - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.cache.null_ttl(), Duration::from_secs(120));
        assert_eq!(config.ids.epoch_secs, 1_640_995_200);
    }

    #[test]
    fn rejects_zero_rate_and_zero_workers() {
        let admission = AdmissionConfig { permits_per_second: 0.0, ..AdmissionConfig::default() };
        assert!(admission.validate().is_err());

        let cache = CacheConfig { rebuild_workers: 0, ..CacheConfig::default() };
        assert!(cache.validate().is_err());
    }

    #[test]
    fn sub_second_cache_ttls_are_kept() {
        let cache = CacheConfig::default()
            .with_ttls(Duration::from_millis(1500), Duration::from_millis(250))
            .with_lock_ttl(Duration::from_millis(800))
            .with_logical_ttl(Duration::from_millis(500));

        assert_eq!(cache.ttl(), Duration::from_millis(1500));
        assert_eq!(cache.null_ttl(), Duration::from_millis(250));
        assert_eq!(cache.lock_ttl(), Duration::from_millis(800));
        assert_eq!(cache.logical_ttl(), Duration::from_millis(500));
        assert!(cache.validate().is_ok());
    }
}
