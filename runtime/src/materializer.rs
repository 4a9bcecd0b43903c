//! Order materializer: turns admitted purchases into durable orders.
//!
//! Messages arrive at least once, so every step is safe to repeat:
//!
//! 1. An order for (user, voucher) already exists → discard.
//! 2. Conditionally decrement stock (`stock > 0`) and insert the order in
//!    one transaction.
//!    - unique violation (a concurrent redelivery won) → discard
//!    - no stock → the gate and the store disagree; log, count, discard
//!
//! Transient store errors are retried with backoff and then surfaced; the
//! consumer keeps the message and tries again later.

use crate::metrics::MaterializerMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use seckill_core::config::MaterializerConfig;
use seckill_core::providers::{InsertOutcome, OrderLedger, StockGate};
use seckill_core::{OrderMessage, Result, SeckillError, VoucherOrder};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to one order message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The order row was written and stock decremented.
    Created,
    /// The user already had an order for this voucher; nothing changed.
    DuplicateDiscarded,
    /// The store had no stock left for an admitted purchase.
    Conflict,
}

impl MaterializeOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::DuplicateDiscarded => "duplicate",
            Self::Conflict => "conflict",
        }
    }
}

/// Handles decoded order messages for the [`OrderConsumer`](crate::consumer::OrderConsumer).
pub trait OrderHandler: Send + Sync {
    /// Process one message.
    ///
    /// # Errors
    ///
    /// Returns error if the message could not be processed. The consumer
    /// retries the same message while the error is retryable and drops it
    /// otherwise.
    fn handle<'a>(
        &'a self,
        message: &'a OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MaterializeOutcome>> + Send + 'a>>;
}

/// Writes orders to the [`OrderLedger`].
pub struct OrderMaterializer<L, G> {
    ledger: Arc<L>,
    gate: Arc<G>,
    config: MaterializerConfig,
}

impl<L, G> OrderMaterializer<L, G>
where
    L: OrderLedger,
    G: StockGate,
{
    /// Create a materializer.
    #[must_use]
    pub const fn new(ledger: Arc<L>, gate: Arc<G>, config: MaterializerConfig) -> Self {
        Self {
            ledger,
            gate,
            config,
        }
    }

    /// Materialize one message.
    ///
    /// # Errors
    ///
    /// Returns `Database` once transient failures outlast the retry budget.
    pub async fn materialize(&self, message: &OrderMessage) -> Result<MaterializeOutcome> {
        let order = VoucherOrder::from_message(message);
        let policy = RetryPolicy::from(&self.config);

        let outcome =
            retry_with_predicate(policy, || self.try_materialize(&order), SeckillError::is_retryable)
                .await?;

        MaterializerMetrics::record_outcome(outcome.label());
        if outcome == MaterializeOutcome::Conflict {
            self.on_conflict(&order).await;
        }
        Ok(outcome)
    }

    async fn try_materialize(&self, order: &VoucherOrder) -> Result<MaterializeOutcome> {
        if self.ledger.has_order(order.user_id, order.voucher_id).await? {
            info!(
                order_id = %order.id,
                user_id = %order.user_id,
                voucher_id = %order.voucher_id,
                "Order already exists, discarding message"
            );
            return Ok(MaterializeOutcome::DuplicateDiscarded);
        }

        match self.ledger.reserve_and_insert(order).await? {
            InsertOutcome::Inserted => {
                info!(order_id = %order.id, user_id = %order.user_id, voucher_id = %order.voucher_id, "Order created");
                Ok(MaterializeOutcome::Created)
            }
            InsertOutcome::AlreadyExists => {
                info!(order_id = %order.id, "Concurrent delivery already created the order");
                Ok(MaterializeOutcome::DuplicateDiscarded)
            }
            InsertOutcome::OutOfStock => Ok(MaterializeOutcome::Conflict),
        }
    }

    async fn on_conflict(&self, order: &VoucherOrder) {
        let conflict = SeckillError::MaterializationConflict {
            order_id: order.id.get(),
            reason: "persistent stock exhausted".to_string(),
        };
        MaterializerMetrics::record_conflict();
        error!(
            order_id = %order.id,
            user_id = %order.user_id,
            voucher_id = %order.voucher_id,
            error = %conflict,
            "Gate admitted a purchase the store refused"
        );

        if !self.config.release_user_on_conflict {
            return;
        }
        if let Err(e) = self.gate.forget_buyer(order.voucher_id, order.user_id).await {
            warn!(
                user_id = %order.user_id,
                voucher_id = %order.voucher_id,
                error = %e,
                "Failed to clear buyer after conflict"
            );
        }
    }
}

impl<L, G> OrderHandler for OrderMaterializer<L, G>
where
    L: OrderLedger,
    G: StockGate,
{
    fn handle<'a>(
        &'a self,
        message: &'a OrderMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MaterializeOutcome>> + Send + 'a>> {
        Box::pin(self.materialize(message))
    }
}
