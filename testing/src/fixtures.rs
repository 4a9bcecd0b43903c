//! Entity fixtures.

use chrono::{Duration, Utc};
use seckill_core::{SeckillVoucher, Shop, ShopId, VoucherId};

/// A shop with plausible field values.
#[must_use]
pub fn sample_shop(id: i64) -> Shop {
    let now = Utc::now();
    Shop {
        id: ShopId(id),
        name: format!("Tea House {id}"),
        type_id: 1,
        images: "https://img.example.com/shop/1.jpg".to_string(),
        area: Some("Riverside".to_string()),
        address: format!("{id} Harbour Road"),
        x: 120.149_192,
        y: 30.316_078,
        avg_price: Some(80),
        sold: 4215,
        comments: 3035,
        score: 37,
        open_hours: Some("10:00-22:00".to_string()),
        created_at: now,
        updated_at: now,
    }
}

/// A voucher on sale from an hour ago until an hour from now.
#[must_use]
pub fn open_voucher(id: i64, stock: i32) -> SeckillVoucher {
    let now = Utc::now();
    SeckillVoucher::new(
        VoucherId(id),
        stock,
        now - Duration::hours(1),
        now + Duration::hours(1),
    )
}
