//! Distributed, time-ordered ID generator.
//!
//! `id = (now − epoch) << 32 | counter`, where `counter` is an atomic
//! increment on a per-(domain, UTC day) key in the coordination store. Ids
//! are unique across processes as long as fewer than 2^32 ids are issued per
//! domain per day and clocks do not step back past the epoch.

use crate::metrics::PurchaseMetrics;
use seckill_core::config::IdGeneratorConfig;
use seckill_core::environment::Clock;
use seckill_core::keys::sequence_key;
use seckill_core::providers::SequenceCounter;
use seckill_core::{OrderId, Result, SeckillError};
use std::sync::Arc;

/// Issues [`OrderId`]s from a shared [`SequenceCounter`].
pub struct IdGenerator<C> {
    counter: Arc<C>,
    clock: Arc<dyn Clock>,
    epoch_secs: i64,
}

impl<C> Clone for IdGenerator<C> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            clock: Arc::clone(&self.clock),
            epoch_secs: self.epoch_secs,
        }
    }
}

impl<C: SequenceCounter> IdGenerator<C> {
    /// Create a generator over `counter` using the configured epoch.
    #[must_use]
    pub fn new(counter: Arc<C>, clock: Arc<dyn Clock>, config: &IdGeneratorConfig) -> Self {
        Self {
            counter,
            clock,
            epoch_secs: config.epoch_secs,
        }
    }

    /// Issue the next id for `domain`.
    ///
    /// # Errors
    ///
    /// - `IdGeneration` if the clock reads before the epoch or the day's
    ///   counter has left the 32-bit sequence space
    /// - `CoordinationStoreUnavailable` if the increment fails
    pub async fn next_id(&self, domain: &str) -> Result<OrderId> {
        let now = self.clock.now();
        let elapsed = u64::try_from(now.timestamp() - self.epoch_secs).map_err(|_| {
            SeckillError::IdGeneration(format!(
                "clock {now} is before the id epoch {}",
                self.epoch_secs
            ))
        })?;

        let key = sequence_key(domain, now);
        let count = self.counter.increment(&key).await?;
        let sequence = u32::try_from(count).map_err(|_| {
            SeckillError::IdGeneration(format!("daily sequence exhausted for {key}"))
        })?;

        PurchaseMetrics::record_id_issued(domain);
        Ok(OrderId::compose(elapsed, sequence))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use seckill_testing::{FixedClock, InMemoryCoordinator};
    use std::collections::HashSet;

    fn generator_at(secs: i64) -> (IdGenerator<InMemoryCoordinator>, Arc<InMemoryCoordinator>) {
        let coordinator = Arc::new(InMemoryCoordinator::new());
        let clock = Arc::new(FixedClock::new(Utc.timestamp_opt(secs, 0).unwrap()));
        let generator =
            IdGenerator::new(Arc::clone(&coordinator), clock, &IdGeneratorConfig::default());
        (generator, coordinator)
    }

    #[tokio::test]
    async fn ids_encode_seconds_since_epoch_and_sequence() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, _) = generator_at(epoch + 3600);

        let first = generator.next_id("order").await.unwrap();
        let second = generator.next_id("order").await.unwrap();

        assert_eq!(first.timestamp_secs(), 3600);
        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert!(second > first);
    }

    #[tokio::test]
    async fn domains_have_independent_counters() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, coordinator) = generator_at(epoch + 10);

        generator.next_id("order").await.unwrap();
        let shop = generator.next_id("shop").await.unwrap();

        assert_eq!(shop.sequence(), 1);
        assert_eq!(coordinator.counter_value("inc:order:2022:01:01"), Some(1));
    }

    #[tokio::test]
    async fn concurrent_callers_never_share_an_id() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, _) = generator_at(epoch + 86_400 * 300);

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let generator = generator.clone();
                tokio::spawn(async move { generator.next_id("order").await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap().unwrap()));
        }
        assert_eq!(ids.len(), 200);
    }

    #[tokio::test]
    async fn clock_before_epoch_is_an_error() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, _) = generator_at(epoch - 1);

        let err = generator.next_id("order").await.unwrap_err();
        assert!(matches!(err, SeckillError::IdGeneration(_)));
    }

    #[tokio::test]
    async fn counter_failure_has_no_fallback() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, coordinator) = generator_at(epoch + 1);
        coordinator.set_unavailable(true);

        let err = generator.next_id("order").await.unwrap_err();
        assert!(matches!(err, SeckillError::CoordinationStoreUnavailable(_)));
    }

    #[tokio::test]
    async fn exhausted_sequence_space_is_an_error() {
        let epoch = IdGeneratorConfig::default().epoch_secs;
        let (generator, coordinator) = generator_at(epoch + 1);
        coordinator.set_counter("inc:order:2022:01:01", u64::from(u32::MAX));

        let err = generator.next_id("order").await.unwrap_err();
        assert!(matches!(err, SeckillError::IdGeneration(_)));
    }
}
