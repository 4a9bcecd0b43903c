//! Durable order ledger.

use crate::error::Result;
use crate::types::{OrderId, UserId, VoucherId, VoucherOrder};

/// Outcome of the ledger's decrement-and-insert transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stock decremented and the order row written.
    Inserted,
    /// The conditional decrement matched no row (stock exhausted or unknown voucher).
    OutOfStock,
    /// An order for this (user, voucher) already exists; nothing changed.
    AlreadyExists,
}

/// Persistent order store: the source of truth for orders and stock.
///
/// # Implementation Notes
///
/// - At most one order per (user, voucher), enforced by the store
/// - Stock is only ever decremented by a conditional `stock > 0` update
pub trait OrderLedger: Send + Sync {
    /// Whether the user already has an order for the voucher.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn has_order(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Decrement stock if positive and insert the order, in one transaction.
    ///
    /// Nothing is written unless both steps succeed.
    ///
    /// # Errors
    ///
    /// Returns `Database` for store failures other than the outcomes above.
    fn reserve_and_insert(
        &self,
        order: &VoucherOrder,
    ) -> impl std::future::Future<Output = Result<InsertOutcome>> + Send;

    /// Look up an order by id.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn find_order(
        &self,
        order_id: OrderId,
    ) -> impl std::future::Future<Output = Result<Option<VoucherOrder>>> + Send;
}
