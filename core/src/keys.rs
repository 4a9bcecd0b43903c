//! Coordination-store key layout.
//!
//! The stock counter and the buyer set of one voucher share a hash tag so a
//! clustered store places them on the same shard, which the gate script
//! requires.

use crate::types::{ShopId, VoucherId};
use chrono::{DateTime, Utc};

/// Remaining-stock counter for a voucher.
#[must_use]
pub fn stock_key(voucher_id: VoucherId) -> String {
    format!("seckill:stock:{{{voucher_id}}}")
}

/// Set of users who already hold a voucher.
#[must_use]
pub fn buyers_key(voucher_id: VoucherId) -> String {
    format!("seckill:order:{{{voucher_id}}}")
}

/// Daily sequence counter for an ID domain, e.g. `inc:order:2026:10:19`.
#[must_use]
pub fn sequence_key(domain: &str, at: DateTime<Utc>) -> String {
    format!("inc:{domain}:{}", at.format("%Y:%m:%d"))
}

/// Cached shop payload.
#[must_use]
pub fn shop_cache_key(id: ShopId) -> String {
    format!("{SHOP_CACHE_PREFIX}{id}")
}

/// Prefix for cached shop payloads.
pub const SHOP_CACHE_PREFIX: &str = "cache:shop:";

/// Prefix for shop rebuild locks.
pub const SHOP_LOCK_PREFIX: &str = "lock:shop:";
