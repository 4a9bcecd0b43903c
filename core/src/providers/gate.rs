//! Atomic stock/idempotency gate.

use crate::error::Result;
use crate::types::{GateOutcome, UserId, VoucherId};

/// Atomic stock/idempotency gate.
///
/// Decides, in one indivisible step per call, whether a user may buy one
/// unit of a voucher.
///
/// # Implementation Notes
///
/// - `try_purchase` must be atomic with respect to every other gate call on
///   the same voucher
/// - Unseeded vouchers fail closed (`OutOfStock`)
/// - Remaining stock never goes below zero
pub trait StockGate: Send + Sync {
    /// Attempt to take one unit for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the store cannot be reached.
    fn try_purchase(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<GateOutcome>> + Send;

    /// Set the stock counter and clear the buyer set, atomically.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the store cannot be reached.
    fn seed(
        &self,
        voucher_id: VoucherId,
        stock: u32,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Undo an admission: return one unit and remove the user.
    ///
    /// Does nothing unless the user is in the buyer set.
    ///
    /// # Returns
    ///
    /// `true` if a reservation was released.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the store cannot be reached.
    fn release(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Remove the user from the buyer set without returning stock.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the store cannot be reached.
    fn forget_buyer(
        &self,
        voucher_id: VoucherId,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Remaining stock, or `None` if the voucher was never seeded.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationStoreUnavailable` if the store cannot be reached.
    fn stock(
        &self,
        voucher_id: VoucherId,
    ) -> impl std::future::Future<Output = Result<Option<i64>>> + Send;
}
