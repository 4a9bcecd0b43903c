//! Seckill voucher rows.

use crate::database_error;
use chrono::{DateTime, Utc};
use seckill_core::providers::VoucherCatalog;
use seckill_core::{Result, SeckillVoucher, VoucherId};
use sqlx::PgPool;

/// `PostgreSQL` [`VoucherCatalog`] over `tb_seckill_voucher`.
#[derive(Clone)]
pub struct PostgresVoucherCatalog {
    pool: PgPool,
}

impl PostgresVoucherCatalog {
    /// Create a catalog over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VoucherRow {
    voucher_id: i64,
    stock: i32,
    begin_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VoucherRow> for SeckillVoucher {
    fn from(row: VoucherRow) -> Self {
        Self {
            voucher_id: VoucherId(row.voucher_id),
            stock: row.stock,
            begin_time: row.begin_time,
            end_time: row.end_time,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl VoucherCatalog for PostgresVoucherCatalog {
    async fn add_seckill_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        // Reopening a sale overwrites the previous stock and window.
        sqlx::query(
            r"
            INSERT INTO tb_seckill_voucher
                (voucher_id, stock, begin_time, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (voucher_id) DO UPDATE
            SET stock = EXCLUDED.stock,
                begin_time = EXCLUDED.begin_time,
                end_time = EXCLUDED.end_time,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(voucher.voucher_id.get())
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .bind(voucher.created_at)
        .bind(voucher.updated_at)
        .execute(&self.pool)
        .await
        .map_err(database_error("save seckill voucher"))?;

        Ok(())
    }

    async fn find_seckill_voucher(&self, voucher_id: VoucherId) -> Result<Option<SeckillVoucher>> {
        let row: Option<VoucherRow> = sqlx::query_as(
            r"
            SELECT voucher_id, stock, begin_time, end_time, created_at, updated_at
            FROM tb_seckill_voucher
            WHERE voucher_id = $1
            ",
        )
        .bind(voucher_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("load seckill voucher"))?;

        Ok(row.map(SeckillVoucher::from))
    }
}
