//! Seckill voucher catalog.

use crate::error::Result;
use crate::types::{SeckillVoucher, VoucherId};

/// Persistent seckill voucher rows.
pub trait VoucherCatalog: Send + Sync {
    /// Insert or replace a seckill voucher.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the write fails.
    fn add_seckill_voucher(
        &self,
        voucher: &SeckillVoucher,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a seckill voucher.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn find_seckill_voucher(
        &self,
        voucher_id: VoucherId,
    ) -> impl std::future::Future<Output = Result<Option<SeckillVoucher>>> + Send;
}
