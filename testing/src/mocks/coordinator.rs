//! In-memory coordination store: gate, sequence counters and cache.

use seckill_core::keys::{buyers_key, stock_key};
use seckill_core::providers::{CacheStore, SequenceCounter, StockGate};
use seckill_core::{GateOutcome, Result, SeckillError, UserId, VoucherId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    sets: HashMap<String, HashSet<i64>>,
}

impl State {
    fn live_value(&mut self, key: &str) -> Option<&str> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key).map(|entry| entry.value.as_str())
    }

    fn put(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.values.insert(key.to_string(), Entry { value, expires_at });
    }

    fn stock(&mut self, voucher_id: VoucherId) -> Option<i64> {
        self.live_value(&stock_key(voucher_id))
            .and_then(|raw| raw.parse().ok())
    }
}

/// Single-process stand-in for Redis.
///
/// Implements [`StockGate`], [`SequenceCounter`] and [`CacheStore`] over one
/// mutex, so every call is atomic just like a server-side script. TTLs use
/// `tokio::time`, so paused-clock tests can expire entries with
/// `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct InMemoryCoordinator {
    state: Mutex<State>,
    unavailable: AtomicBool,
    gate_calls: AtomicUsize,
}

impl InMemoryCoordinator {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every provider call fail with `CoordinationStoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `try_purchase` calls seen.
    #[must_use]
    pub fn gate_calls(&self) -> usize {
        self.gate_calls.load(Ordering::SeqCst)
    }

    /// Current counter value, bypassing availability.
    #[must_use]
    pub fn counter_value(&self, key: &str) -> Option<u64> {
        self.raw_get(key).and_then(|raw| raw.parse().ok())
    }

    /// Force a counter value.
    pub fn set_counter(&self, key: &str, value: u64) {
        self.raw_set(key, &value.to_string());
    }

    /// Whether `user_id` is in the voucher's buyer set.
    #[must_use]
    pub fn is_buyer(&self, voucher_id: VoucherId, user_id: UserId) -> bool {
        self.state.lock().is_ok_and(|state| {
            state
                .sets
                .get(&buyers_key(voucher_id))
                .is_some_and(|set| set.contains(&user_id.get()))
        })
    }

    /// Size of the voucher's buyer set.
    #[must_use]
    pub fn buyer_count(&self, voucher_id: VoucherId) -> usize {
        self.state
            .lock()
            .map(|state| state.sets.get(&buyers_key(voucher_id)).map_or(0, HashSet::len))
            .unwrap_or(0)
    }

    /// Read a live key, bypassing availability.
    #[must_use]
    pub fn raw_get(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|mut state| state.live_value(key).map(str::to_string))
    }

    /// Write a key with no TTL, bypassing availability.
    pub fn raw_set(&self, key: &str, value: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.put(key, value.to_string(), None);
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SeckillError::CoordinationStoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        self.state.lock().map_err(|_| {
            SeckillError::CoordinationStoreUnavailable("state mutex poisoned".to_string())
        })
    }
}

impl StockGate for InMemoryCoordinator {
    async fn try_purchase(&self, voucher_id: VoucherId, user_id: UserId) -> Result<GateOutcome> {
        self.gate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.guard()?;

        let stock = state.stock(voucher_id).unwrap_or(0);
        if stock <= 0 {
            return Ok(GateOutcome::OutOfStock);
        }

        let buyers = state.sets.entry(buyers_key(voucher_id)).or_default();
        if !buyers.insert(user_id.get()) {
            return Ok(GateOutcome::Duplicate);
        }
        state.put(&stock_key(voucher_id), (stock - 1).to_string(), None);
        Ok(GateOutcome::Admitted)
    }

    async fn seed(&self, voucher_id: VoucherId, stock: u32) -> Result<()> {
        let mut state = self.guard()?;
        state.put(&stock_key(voucher_id), stock.to_string(), None);
        state.sets.remove(&buyers_key(voucher_id));
        Ok(())
    }

    async fn release(&self, voucher_id: VoucherId, user_id: UserId) -> Result<bool> {
        let mut state = self.guard()?;
        let removed = state
            .sets
            .get_mut(&buyers_key(voucher_id))
            .is_some_and(|set| set.remove(&user_id.get()));
        if removed {
            let stock = state.stock(voucher_id).unwrap_or(0);
            state.put(&stock_key(voucher_id), (stock + 1).to_string(), None);
        }
        Ok(removed)
    }

    async fn forget_buyer(&self, voucher_id: VoucherId, user_id: UserId) -> Result<bool> {
        let mut state = self.guard()?;
        Ok(state
            .sets
            .get_mut(&buyers_key(voucher_id))
            .is_some_and(|set| set.remove(&user_id.get())))
    }

    async fn stock(&self, voucher_id: VoucherId) -> Result<Option<i64>> {
        Ok(self.guard()?.stock(voucher_id))
    }
}

impl SequenceCounter for InMemoryCoordinator {
    async fn increment(&self, key: &str) -> Result<u64> {
        let mut state = self.guard()?;
        let next = state
            .live_value(key)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        state.put(key, next.to_string(), None);
        Ok(next)
    }
}

impl CacheStore for InMemoryCoordinator {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.guard()?.live_value(key).map(str::to_string))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.guard()?.put(key, value.to_string(), Some(ttl));
        Ok(())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.guard()?.put(key, value.to_string(), None);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.guard()?;
        if state.live_value(key).is_some() {
            return Ok(false);
        }
        state.put(key, value.to_string(), Some(ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.guard()?.values.remove(key);
        Ok(())
    }
}
