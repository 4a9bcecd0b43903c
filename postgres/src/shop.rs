//! Shop repository.

use crate::database_error;
use chrono::{DateTime, Utc};
use seckill_core::providers::EntityRepository;
use seckill_core::{Result, SeckillError, Shop, ShopId};
use sqlx::PgPool;

/// `PostgreSQL` [`EntityRepository`] for [`Shop`] over `tb_shop`.
#[derive(Clone)]
pub struct PostgresShopRepository {
    pool: PgPool,
}

impl PostgresShopRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a shop row.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the insert fails, including a duplicate id.
    pub async fn insert(&self, shop: &Shop) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO tb_shop
                (id, name, type_id, images, area, address, x, y, avg_price,
                 sold, comments, score, open_hours, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(shop.id.get())
        .bind(&shop.name)
        .bind(shop.type_id)
        .bind(&shop.images)
        .bind(&shop.area)
        .bind(&shop.address)
        .bind(shop.x)
        .bind(shop.y)
        .bind(shop.avg_price)
        .bind(shop.sold)
        .bind(shop.comments)
        .bind(shop.score)
        .bind(&shop.open_hours)
        .bind(shop.created_at)
        .bind(shop.updated_at)
        .execute(&self.pool)
        .await
        .map_err(database_error("insert shop"))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ShopRow {
    id: i64,
    name: String,
    type_id: i64,
    images: String,
    area: Option<String>,
    address: String,
    x: f64,
    y: f64,
    avg_price: Option<i64>,
    sold: i32,
    comments: i32,
    score: i32,
    open_hours: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: ShopId(row.id),
            name: row.name,
            type_id: row.type_id,
            images: row.images,
            area: row.area,
            address: row.address,
            x: row.x,
            y: row.y,
            avg_price: row.avg_price,
            sold: row.sold,
            comments: row.comments,
            score: row.score,
            open_hours: row.open_hours,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl EntityRepository<Shop> for PostgresShopRepository {
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>> {
        let row: Option<ShopRow> = sqlx::query_as(
            r"
            SELECT id, name, type_id, images, area, address, x, y, avg_price,
                   sold, comments, score, open_hours, created_at, updated_at
            FROM tb_shop
            WHERE id = $1
            ",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error("load shop"))?;

        Ok(row.map(Shop::from))
    }

    async fn update(&self, shop: &Shop) -> Result<()> {
        let updated = sqlx::query(
            r"
            UPDATE tb_shop
            SET name = $2, type_id = $3, images = $4, area = $5, address = $6,
                x = $7, y = $8, avg_price = $9, sold = $10, comments = $11,
                score = $12, open_hours = $13, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(shop.id.get())
        .bind(&shop.name)
        .bind(shop.type_id)
        .bind(&shop.images)
        .bind(&shop.area)
        .bind(&shop.address)
        .bind(shop.x)
        .bind(shop.y)
        .bind(shop.avg_price)
        .bind(shop.sold)
        .bind(shop.comments)
        .bind(shop.score)
        .bind(&shop.open_hours)
        .execute(&self.pool)
        .await
        .map_err(database_error("update shop"))?
        .rows_affected();

        if updated == 0 {
            return Err(SeckillError::InvalidInput(format!("shop {} does not exist", shop.id)));
        }
        Ok(())
    }
}
