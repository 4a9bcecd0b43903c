//! Sale opener: makes a seckill voucher purchasable.

use seckill_core::providers::{StockGate, VoucherCatalog};
use seckill_core::{Result, SeckillError, SeckillVoucher};
use std::sync::Arc;
use tracing::info;

/// Persists a voucher and seeds the gate with its stock.
pub struct SaleOpener<V, G> {
    catalog: Arc<V>,
    gate: Arc<G>,
}

impl<V, G> SaleOpener<V, G>
where
    V: VoucherCatalog,
    G: StockGate,
{
    /// Create an opener.
    #[must_use]
    pub const fn new(catalog: Arc<V>, gate: Arc<G>) -> Self {
        Self { catalog, gate }
    }

    /// Write the voucher to the persistent store, then seed the gate.
    ///
    /// Seeding resets the buyer set, so reopening a sale starts fresh.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the voucher fails validation
    /// - `Database` if the write fails (the gate is left untouched)
    /// - `CoordinationStoreUnavailable` if seeding fails
    pub async fn open_sale(&self, voucher: &SeckillVoucher) -> Result<()> {
        voucher.validate()?;
        let stock = u32::try_from(voucher.stock).map_err(|_| {
            SeckillError::InvalidInput(format!("voucher {} stock out of range", voucher.voucher_id))
        })?;

        self.catalog.add_seckill_voucher(voucher).await?;
        self.gate.seed(voucher.voucher_id, stock).await?;

        info!(
            voucher_id = %voucher.voucher_id,
            stock,
            begin = %voucher.begin_time,
            end = %voucher.end_time,
            "Seckill sale opened"
        );
        Ok(())
    }
}
