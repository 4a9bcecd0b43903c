//! In-memory order ledger and voucher catalog.

use seckill_core::providers::{InsertOutcome, OrderLedger, VoucherCatalog};
use seckill_core::{
    OrderId, Result, SeckillError, SeckillVoucher, UserId, VoucherId, VoucherOrder,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    vouchers: HashMap<VoucherId, SeckillVoucher>,
    orders: HashMap<OrderId, VoucherOrder>,
    buyers: HashSet<(UserId, VoucherId)>,
}

/// Stand-in for the Postgres ledger.
///
/// Enforces the same constraints as the schema: one order per (user,
/// voucher), unique order ids and stock that never goes negative.
#[derive(Debug, Default)]
pub struct InMemoryOrderLedger {
    state: Mutex<State>,
    transient_failures: AtomicUsize,
    insert_attempts: AtomicUsize,
}

impl InMemoryOrderLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with a retryable `Database` error.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Number of `reserve_and_insert` calls that reached the store.
    #[must_use]
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// Orders recorded for a voucher.
    #[must_use]
    pub fn order_count(&self, voucher_id: VoucherId) -> usize {
        self.state
            .lock()
            .map(|state| {
                state
                    .orders
                    .values()
                    .filter(|order| order.voucher_id == voucher_id)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Persistent stock of a voucher.
    #[must_use]
    pub fn stock(&self, voucher_id: VoucherId) -> Option<i32> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.vouchers.get(&voucher_id).map(|v| v.stock))
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>> {
        let injected = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SeckillError::Database("connection reset".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| SeckillError::Database("state mutex poisoned".to_string()))
    }
}

impl OrderLedger for InMemoryOrderLedger {
    async fn has_order(&self, user_id: UserId, voucher_id: VoucherId) -> Result<bool> {
        Ok(self.guard()?.buyers.contains(&(user_id, voucher_id)))
    }

    async fn reserve_and_insert(&self, order: &VoucherOrder) -> Result<InsertOutcome> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.guard()?;

        if state.buyers.contains(&(order.user_id, order.voucher_id))
            || state.orders.contains_key(&order.id)
        {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let Some(voucher) = state
            .vouchers
            .get_mut(&order.voucher_id)
            .filter(|voucher| voucher.stock > 0)
        else {
            return Ok(InsertOutcome::OutOfStock);
        };
        voucher.stock -= 1;

        state.buyers.insert((order.user_id, order.voucher_id));
        state.orders.insert(order.id, order.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<VoucherOrder>> {
        Ok(self.guard()?.orders.get(&order_id).cloned())
    }
}

impl VoucherCatalog for InMemoryOrderLedger {
    async fn add_seckill_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        self.guard()?
            .vouchers
            .insert(voucher.voucher_id, voucher.clone());
        Ok(())
    }

    async fn find_seckill_voucher(&self, voucher_id: VoucherId) -> Result<Option<SeckillVoucher>> {
        Ok(self.guard()?.vouchers.get(&voucher_id).cloned())
    }
}
