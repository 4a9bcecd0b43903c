//! Durable order ledger.
//!
//! Stock is decremented with `WHERE stock > 0` and the order is inserted in
//! the same transaction, so the row count and the orders table cannot drift.
//! The `(user_id, voucher_id)` unique constraint catches concurrent
//! redeliveries that slip past `has_order`.

use crate::database_error;
use chrono::{DateTime, Utc};
use seckill_core::providers::{InsertOutcome, OrderLedger};
use seckill_core::{
    OrderId, OrderStatus, PayType, Result, UserId, VoucherId, VoucherOrder,
};
use sqlx::PgPool;

/// `PostgreSQL` [`OrderLedger`] over `tb_seckill_voucher` and `tb_voucher_order`.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
    /// Create a ledger over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Orders recorded for a voucher.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    pub async fn count_orders(&self, voucher_id: VoucherId) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tb_voucher_order WHERE voucher_id = $1")
                .bind(voucher_id.get())
                .fetch_one(&self.pool)
                .await
                .map_err(database_error("count orders"))?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    voucher_id: i64,
    pay_type: i16,
    status: i16,
    created_at: DateTime<Utc>,
    pay_time: Option<DateTime<Utc>>,
    use_time: Option<DateTime<Utc>>,
    refund_time: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for VoucherOrder {
    type Error = seckill_core::SeckillError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: OrderId::from_i64(row.id)?,
            user_id: UserId(row.user_id),
            voucher_id: VoucherId(row.voucher_id),
            pay_type: PayType::from_i16(row.pay_type)?,
            status: OrderStatus::from_i16(row.status)?,
            created_at: row.created_at,
            pay_time: row.pay_time,
            use_time: row.use_time,
            refund_time: row.refund_time,
            updated_at: row.updated_at,
        })
    }
}

impl OrderLedger for PostgresOrderLedger {
    async fn has_order(&self, user_id: UserId, voucher_id: VoucherId) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM tb_voucher_order WHERE user_id = $1 AND voucher_id = $2)",
        )
        .bind(user_id.get())
        .bind(voucher_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(database_error("check existing order"))?;

        Ok(exists)
    }

    async fn reserve_and_insert(&self, order: &VoucherOrder) -> Result<InsertOutcome> {
        let order_id = order.id.to_i64()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(database_error("begin transaction"))?;

        let reserved = sqlx::query(
            r"
            UPDATE tb_seckill_voucher
            SET stock = stock - 1, updated_at = now()
            WHERE voucher_id = $1 AND stock > 0
            ",
        )
        .bind(order.voucher_id.get())
        .execute(&mut *tx)
        .await
        .map_err(database_error("decrement stock"))?
        .rows_affected();

        if reserved == 0 {
            // A concurrent delivery of the same purchase may have taken the
            // last unit; that is a duplicate, not a conflict.
            let (exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS(SELECT 1 FROM tb_voucher_order WHERE user_id = $1 AND voucher_id = $2)",
            )
            .bind(order.user_id.get())
            .bind(order.voucher_id.get())
            .fetch_one(&mut *tx)
            .await
            .map_err(database_error("check existing order"))?;

            tx.rollback()
                .await
                .map_err(database_error("roll back transaction"))?;

            return Ok(if exists {
                InsertOutcome::AlreadyExists
            } else {
                InsertOutcome::OutOfStock
            });
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO tb_voucher_order
                (id, user_id, voucher_id, pay_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(order_id)
        .bind(order.user_id.get())
        .bind(order.voucher_id.get())
        .bind(order.pay_type.as_i16())
        .bind(order.status.as_i16())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback()
                    .await
                    .map_err(database_error("roll back transaction"))?;
                metrics::counter!("seckill_ledger_unique_violations_total").increment(1);
                tracing::debug!(order_id = %order.id, "Order already recorded");
                return Ok(InsertOutcome::AlreadyExists);
            }
            Err(e) => return Err(database_error("insert order")(e)),
        }

        tx.commit()
            .await
            .map_err(database_error("commit order"))?;

        Ok(InsertOutcome::Inserted)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<VoucherOrder>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, user_id, voucher_id, pay_type, status, created_at,
                   pay_time, use_time, refund_time, updated_at
            FROM tb_voucher_order
            WHERE id = $1
            ",
        )
        .bind(order_id.to_i64()?)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("load order"))?;

        row.map(VoucherOrder::try_from).transpose()
    }
}
