//! Order dispatcher: the synchronous half of a seckill purchase.
//!
//! ```text
//! seckill_voucher(user, voucher)
//!   ├─ AdmissionController::try_acquire ── timeout ──► AdmissionRejected
//!   ├─ StockGate::try_purchase
//!   │     ├─ OutOfStock ─────────────────────────────► OutOfStock
//!   │     ├─ Duplicate ──────────────────────────────► DuplicatePurchase
//!   │     └─ Admitted
//!   ├─ IdGenerator::next_id ─┐
//!   ├─ OrderChannel::publish ┴─ failure ─► StockGate::release, error
//!   └─► Ok(order id)   (admitted, not yet persisted)
//! ```

use crate::admission::AdmissionController;
use crate::id_generator::IdGenerator;
use crate::metrics::PurchaseMetrics;
use seckill_core::environment::Clock;
use seckill_core::providers::{OrderChannel, SequenceCounter, StockGate};
use seckill_core::{
    GateOutcome, OrderId, OrderMessage, Result, SeckillError, UserContext, UserId, VoucherId,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Admits purchases and hands admitted ones to the order channel.
pub struct OrderDispatcher<G, C> {
    admission: Arc<AdmissionController>,
    gate: Arc<G>,
    ids: IdGenerator<C>,
    channel: Arc<dyn OrderChannel>,
    clock: Arc<dyn Clock>,
    order_domain: String,
}

impl<G, C> OrderDispatcher<G, C>
where
    G: StockGate,
    C: SequenceCounter,
{
    /// Create a dispatcher. Order ids are drawn from `order_domain`.
    #[must_use]
    pub fn new(
        admission: Arc<AdmissionController>,
        gate: Arc<G>,
        ids: IdGenerator<C>,
        channel: Arc<dyn OrderChannel>,
        clock: Arc<dyn Clock>,
        order_domain: impl Into<String>,
    ) -> Self {
        Self {
            admission,
            gate,
            ids,
            channel,
            clock,
            order_domain: order_domain.into(),
        }
    }

    /// Try to buy one unit of `voucher_id` for the caller.
    ///
    /// Success means the purchase was admitted and its order message
    /// accepted by the channel; the order row is written asynchronously.
    ///
    /// # Errors
    ///
    /// - `AdmissionRejected` if no permit was available within the timeout
    /// - `OutOfStock` / `DuplicatePurchase` from the gate
    /// - `CoordinationStoreUnavailable`, `IdGeneration` or `Channel` on
    ///   infrastructure failure; any reservation taken is released first
    pub async fn seckill_voucher(
        &self,
        caller: &UserContext,
        voucher_id: VoucherId,
    ) -> Result<OrderId> {
        let user_id = caller.user_id;

        if let Err(e) = self.admission.try_acquire_default().await {
            PurchaseMetrics::record_outcome("rejected");
            return Err(e);
        }

        let started = Instant::now();
        let outcome = self.gate.try_purchase(voucher_id, user_id).await;
        PurchaseMetrics::record_gate(started.elapsed());

        match outcome {
            Ok(GateOutcome::Admitted) => {}
            Ok(GateOutcome::OutOfStock) => {
                PurchaseMetrics::record_outcome("out_of_stock");
                debug!(%voucher_id, %user_id, "Gate: out of stock");
                return Err(SeckillError::OutOfStock {
                    voucher_id: voucher_id.get(),
                });
            }
            Ok(GateOutcome::Duplicate) => {
                PurchaseMetrics::record_outcome("duplicate");
                debug!(%voucher_id, %user_id, "Gate: duplicate purchase");
                return Err(SeckillError::DuplicatePurchase {
                    user_id: user_id.get(),
                    voucher_id: voucher_id.get(),
                });
            }
            Err(e) => {
                PurchaseMetrics::record_outcome("error");
                error!(%voucher_id, %user_id, error = %e, "Gate unavailable");
                return Err(e);
            }
        }

        match self.dispatch(user_id, voucher_id).await {
            Ok(order_id) => {
                PurchaseMetrics::record_outcome("admitted");
                info!(%voucher_id, %user_id, %order_id, "Purchase admitted");
                Ok(order_id)
            }
            Err(e) => {
                PurchaseMetrics::record_outcome("error");
                error!(%voucher_id, %user_id, error = %e, "Dispatch failed after admission, releasing reservation");
                self.release(voucher_id, user_id).await;
                Err(e)
            }
        }
    }

    async fn dispatch(&self, user_id: UserId, voucher_id: VoucherId) -> Result<OrderId> {
        let order_id = self.ids.next_id(&self.order_domain).await?;
        let message = OrderMessage {
            order_id,
            user_id,
            voucher_id,
            created_at: self.clock.now(),
        };
        self.channel.publish(&message).await?;
        Ok(order_id)
    }

    async fn release(&self, voucher_id: VoucherId, user_id: UserId) {
        match self.gate.release(voucher_id, user_id).await {
            Ok(true) => PurchaseMetrics::record_release(),
            Ok(false) => debug!(%voucher_id, %user_id, "No reservation to release"),
            Err(e) => {
                error!(%voucher_id, %user_id, error = %e, "Failed to release reservation; stock unit is lost");
            }
        }
    }
}
