//! Admission controller: a process-wide token bucket in front of the gate.
//!
//! ```text
//! Bucket (capacity: 10 permits, refill: 10/s)
//! ├─ A permit in the bucket  → taken immediately
//! ├─ Next permit due within the timeout → reserved, caller sleeps until due
//! └─ Otherwise              → AdmissionRejected, nothing reserved
//! ```
//!
//! Reservations make the limiter smooth: concurrent waiters queue behind
//! each other instead of all waking at the same refill tick. The limit is
//! per process; N instances admit up to N × rate.

use crate::metrics::PurchaseMetrics;
use seckill_core::config::AdmissionConfig;
use seckill_core::{Result, SeckillError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct BucketState {
    /// May go negative while reservations are outstanding.
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket admission controller.
pub struct AdmissionController {
    rate: f64,
    capacity: f64,
    default_timeout: Duration,
    state: Mutex<BucketState>,
}

impl AdmissionController {
    /// Create a controller with a full bucket.
    #[must_use]
    pub fn new(config: &AdmissionConfig) -> Self {
        let capacity = config.capacity();
        Self {
            rate: config.permits_per_second,
            capacity,
            default_timeout: config.acquire_timeout(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Timeout used by [`try_acquire_default`](Self::try_acquire_default).
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Acquire one permit, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::AdmissionRejected`] immediately if no permit
    /// can be granted within `timeout`.
    pub async fn try_acquire(&self, timeout: Duration) -> Result<()> {
        let wait = {
            let mut state = self.state.lock().await;
            self.refill(&mut state);

            // An unrepresentable wait (a vanishing rate) is beyond any timeout.
            let wait = if state.tokens >= 1.0 {
                Some(Duration::ZERO)
            } else {
                Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate).ok()
            };

            let Some(wait) = wait.filter(|wait| *wait <= timeout) else {
                debug!(wait = ?wait, "Admission rejected");
                return Err(SeckillError::AdmissionRejected);
            };

            state.tokens -= 1.0;
            PurchaseMetrics::record_available_permits(state.tokens.max(0.0));
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// [`try_acquire`](Self::try_acquire) with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SeckillError::AdmissionRejected`] on timeout.
    pub async fn try_acquire_default(&self) -> Result<()> {
        self.try_acquire(self.default_timeout).await
    }

    /// Permits that could be taken right now without waiting.
    pub async fn available_permits(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens.max(0.0)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn controller(rate: f64, capacity: f64) -> AdmissionController {
        AdmissionController::new(
            &AdmissionConfig::default()
                .with_permits_per_second(rate)
                .with_burst_capacity(capacity),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stored_permits_are_granted_without_waiting() {
        let limiter = controller(10.0, 3.0);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.try_acquire(Duration::ZERO).await.is_ok());
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            limiter.try_acquire(Duration::ZERO).await,
            Err(SeckillError::AdmissionRejected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_permit_due_within_the_timeout() {
        let limiter = controller(10.0, 1.0);
        limiter.try_acquire(Duration::ZERO).await.ok();

        let start = Instant::now();
        assert!(limiter.try_acquire(Duration::from_millis(500)).await.is_ok());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(99) && waited <= Duration::from_millis(101));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_without_waiting_when_permit_is_too_far_out() {
        let limiter = controller(1.0, 1.0);
        limiter.try_acquire(Duration::ZERO).await.ok();

        let start = Instant::now();
        let result = limiter.try_acquire(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(SeckillError::AdmissionRejected)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn vanishing_rate_rejects_instead_of_overflowing() {
        let limiter = controller(1e-300, 1.0);
        assert!(limiter.try_acquire(Duration::ZERO).await.is_ok());

        let result = limiter.try_acquire(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(SeckillError::AdmissionRejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let limiter = controller(10.0, 2.0);
        limiter.try_acquire(Duration::ZERO).await.ok();
        limiter.try_acquire(Duration::ZERO).await.ok();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available_permits().await - 2.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_about_rate_times_timeout_under_burst() {
        let limiter = Arc::new(controller(10.0, 10.0));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.try_acquire(Duration::from_secs(1)).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                admitted += 1;
            }
        }
        // 10 stored + 10 reserved within the one-second window
        assert_eq!(admitted, 20);
    }
}
