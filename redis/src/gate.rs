//! Redis stock/idempotency gate.
//!
//! The check-and-reserve runs as a single Lua script so that Redis executes
//! it without interleaving any other command.

use crate::{ConnectionManager, unavailable};
use redis::{AsyncCommands, Script};
use seckill_core::keys::{buyers_key, stock_key};
use seckill_core::providers::StockGate;
use seckill_core::{GateOutcome, Result, UserId, VoucherId};

/// Returns 0 admitted, 1 out of stock (including unseeded), 2 duplicate.
const PURCHASE_SCRIPT: &str = r"
local stock = tonumber(redis.call('get', KEYS[1]))
if stock == nil or stock <= 0 then
    return 1
end
if redis.call('sismember', KEYS[2], ARGV[1]) == 1 then
    return 2
end
redis.call('incrby', KEYS[1], -1)
redis.call('sadd', KEYS[2], ARGV[1])
return 0
";

/// Returns 1 if the user held a reservation and one unit went back.
const RELEASE_SCRIPT: &str = r"
if redis.call('srem', KEYS[2], ARGV[1]) == 1 then
    redis.call('incrby', KEYS[1], 1)
    return 1
end
return 0
";

/// Redis-backed [`StockGate`].
///
/// Keys: `seckill:stock:{id}` holds remaining stock as an integer string,
/// `seckill:order:{id}` is the set of admitted user ids.
#[derive(Clone)]
pub struct RedisStockGate {
    conn_manager: ConnectionManager,
    purchase: Script,
    release: Script,
}

impl RedisStockGate {
    /// Create a gate over an existing connection.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            purchase: Script::new(PURCHASE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

impl StockGate for RedisStockGate {
    async fn try_purchase(&self, voucher_id: VoucherId, user_id: UserId) -> Result<GateOutcome> {
        let mut conn = self.conn_manager.clone();

        let code: i64 = self
            .purchase
            .key(stock_key(voucher_id))
            .key(buyers_key(voucher_id))
            .arg(user_id.get())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| unavailable("run purchase script", &e))?;

        GateOutcome::from_code(code)
    }

    async fn seed(&self, voucher_id: VoucherId, stock: u32) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: () = redis::pipe()
            .atomic()
            .set(stock_key(voucher_id), stock)
            .ignore()
            .del(buyers_key(voucher_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("seed voucher stock", &e))?;

        tracing::debug!(voucher_id = %voucher_id, stock, "Seeded gate");
        Ok(())
    }

    async fn release(&self, voucher_id: VoucherId, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let released: i64 = self
            .release
            .key(stock_key(voucher_id))
            .key(buyers_key(voucher_id))
            .arg(user_id.get())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| unavailable("run release script", &e))?;

        Ok(released == 1)
    }

    async fn forget_buyer(&self, voucher_id: VoucherId, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let removed: i64 = conn
            .srem(buyers_key(voucher_id), user_id.get())
            .await
            .map_err(|e| unavailable("remove buyer", &e))?;

        Ok(removed == 1)
    }

    async fn stock(&self, voucher_id: VoucherId) -> Result<Option<i64>> {
        let mut conn = self.conn_manager.clone();

        conn.get(stock_key(voucher_id))
            .await
            .map_err(|e| unavailable("read voucher stock", &e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connect;

    async fn gate() -> RedisStockGate {
        RedisStockGate::new(connect("redis://127.0.0.1:6379").await.unwrap())
    }

    fn fresh_voucher() -> VoucherId {
        VoucherId(rand::random::<u32>().into())
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn unseeded_voucher_is_out_of_stock() {
        let gate = gate().await;
        let outcome = gate.try_purchase(fresh_voucher(), UserId(1)).await.unwrap();
        assert_eq!(outcome, GateOutcome::OutOfStock);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn purchase_reserves_once_per_user() {
        let gate = gate().await;
        let voucher = fresh_voucher();
        gate.seed(voucher, 2).await.unwrap();

        assert_eq!(gate.try_purchase(voucher, UserId(1)).await.unwrap(), GateOutcome::Admitted);
        assert_eq!(gate.try_purchase(voucher, UserId(1)).await.unwrap(), GateOutcome::Duplicate);
        assert_eq!(gate.try_purchase(voucher, UserId(2)).await.unwrap(), GateOutcome::Admitted);
        assert_eq!(gate.try_purchase(voucher, UserId(3)).await.unwrap(), GateOutcome::OutOfStock);
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(0));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn concurrent_buyers_never_oversell() {
        let gate = gate().await;
        let voucher = fresh_voucher();
        gate.seed(voucher, 10).await.unwrap();

        let handles: Vec<_> = (0..100)
            .map(|user| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.try_purchase(voucher, UserId(user)).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == GateOutcome::Admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(0));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn release_only_returns_stock_for_members() {
        let gate = gate().await;
        let voucher = fresh_voucher();
        gate.seed(voucher, 1).await.unwrap();
        gate.try_purchase(voucher, UserId(7)).await.unwrap();

        assert!(!gate.release(voucher, UserId(8)).await.unwrap());
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(0));

        assert!(gate.release(voucher, UserId(7)).await.unwrap());
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(1));
        assert!(!gate.release(voucher, UserId(7)).await.unwrap());
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(1));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn forget_buyer_keeps_stock_and_reseed_clears_buyers() {
        let gate = gate().await;
        let voucher = fresh_voucher();
        gate.seed(voucher, 1).await.unwrap();
        gate.try_purchase(voucher, UserId(1)).await.unwrap();

        assert!(gate.forget_buyer(voucher, UserId(1)).await.unwrap());
        assert_eq!(gate.stock(voucher).await.unwrap(), Some(0));

        gate.try_purchase(voucher, UserId(2)).await.unwrap();
        gate.seed(voucher, 1).await.unwrap();
        assert_eq!(gate.try_purchase(voucher, UserId(2)).await.unwrap(), GateOutcome::Admitted);
    }
}
