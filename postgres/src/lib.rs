//! `PostgreSQL` persistence for the seckill pipeline.
//!
//! - [`PostgresOrderLedger`]: durable orders with the conditional stock
//!   decrement and the `(user_id, voucher_id)` uniqueness backstop
//! - [`PostgresVoucherCatalog`]: seckill voucher rows
//! - [`PostgresShopRepository`]: the entity behind the cache guard
//!
//! All three share one [`PgPool`].
//!
//! # Example
//!
//! ```no_run
//! use seckill_postgres::{PostgresOrderLedger, connect, migrate};
//!
//! # async fn example() -> seckill_core::Result<()> {
//! let pool = connect("postgres://localhost/seckill", 10).await?;
//! migrate(&pool).await?;
//! let ledger = PostgresOrderLedger::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod ledger;
mod shop;

pub use catalog::PostgresVoucherCatalog;
pub use ledger::PostgresOrderLedger;
pub use shop::PostgresShopRepository;
pub use sqlx::PgPool;

use seckill_core::{Result, SeckillError};
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns `Database` if the pool cannot connect.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| SeckillError::Database(format!("Failed to connect: {e}")))?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Create or upgrade the seckill tables.
///
/// # Errors
///
/// Returns `Database` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| SeckillError::Database(format!("Migration failed: {e}")))?;
    Ok(())
}

pub(crate) fn database_error(action: &'static str) -> impl Fn(sqlx::Error) -> SeckillError {
    move |e| SeckillError::Database(format!("Failed to {action}: {e}"))
}
