//! Backend wiring and consumer lifecycle.

use crate::config::ServiceConfig;
use anyhow::Context;
use seckill_core::environment::{Clock, SystemClock};
use seckill_core::providers::OrderChannel;
use seckill_core::{SeckillVoucher, Shop, ShopId};
use seckill_postgres::{
    PostgresOrderLedger, PostgresShopRepository, PostgresVoucherCatalog,
};
use seckill_redis::{RedisCacheStore, RedisSequenceCounter, RedisStockGate};
use seckill_redpanda::RedpandaOrderChannel;
use seckill_runtime::retry::{RetryPolicy, retry_with_backoff};
use seckill_runtime::{
    AdmissionController, CacheGuard, IdGenerator, OrderConsumer, OrderDispatcher, OrderHandler,
    OrderMaterializer, SaleOpener,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Purchase path over Redis.
pub type Dispatcher = OrderDispatcher<RedisStockGate, RedisSequenceCounter>;

/// Order writer over `PostgreSQL`, releasing buyers in Redis on conflict.
pub type Materializer = OrderMaterializer<PostgresOrderLedger, RedisStockGate>;

/// Shop cache guard.
pub type ShopCache = CacheGuard<Shop, RedisCacheStore, PostgresShopRepository>;

/// The running service.
pub struct SeckillApp {
    config: ServiceConfig,
    dispatcher: Arc<Dispatcher>,
    materializer: Arc<Materializer>,
    sale_opener: SaleOpener<PostgresVoucherCatalog, RedisStockGate>,
    shops: ShopCache,
    channel: Arc<dyn OrderChannel>,
    shutdown_tx: broadcast::Sender<()>,
    consumer: Option<JoinHandle<()>>,
}

fn connect_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(5))
        .build()
}

impl SeckillApp {
    /// Connect every backend and run migrations.
    ///
    /// Connections are retried with backoff so the process can start before
    /// its dependencies are ready.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or a backend stays
    /// unreachable.
    pub async fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        config
            .seckill
            .validate()
            .context("Invalid seckill configuration")?;

        tracing::info!("Connecting to Redis...");
        let redis = retry_with_backoff(connect_policy(), || seckill_redis::connect(&config.redis_url))
            .await
            .context("Redis unavailable")?;

        tracing::info!("Connecting to PostgreSQL...");
        let pool = retry_with_backoff(connect_policy(), || {
            seckill_postgres::connect(&config.database_url, config.database_max_connections)
        })
        .await
        .context("PostgreSQL unavailable")?;
        seckill_postgres::migrate(&pool)
            .await
            .context("Failed to migrate database")?;

        tracing::info!("Connecting to Redpanda...");
        let channel: Arc<dyn OrderChannel> = Arc::new(
            RedpandaOrderChannel::builder()
                .brokers(&config.redpanda.brokers)
                .topic(&config.redpanda.topic)
                .consumer_group(&config.redpanda.consumer_group)
                .build()
                .context("Failed to create order channel")?,
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gate = Arc::new(RedisStockGate::new(redis.clone()));
        let counter = Arc::new(RedisSequenceCounter::new(redis.clone()));
        let cache_store = Arc::new(RedisCacheStore::new(redis));

        let ids = IdGenerator::new(counter, Arc::clone(&clock), &config.seckill.ids);
        let dispatcher = OrderDispatcher::new(
            Arc::new(AdmissionController::new(&config.seckill.admission)),
            Arc::clone(&gate),
            ids,
            Arc::clone(&channel),
            Arc::clone(&clock),
            config.seckill.ids.order_domain.clone(),
        );
        let materializer = OrderMaterializer::new(
            Arc::new(PostgresOrderLedger::new(pool.clone())),
            Arc::clone(&gate),
            config.seckill.materializer.clone(),
        );
        let sale_opener =
            SaleOpener::new(Arc::new(PostgresVoucherCatalog::new(pool.clone())), gate);
        let shops = CacheGuard::for_shops(
            cache_store,
            Arc::new(PostgresShopRepository::new(pool)),
            clock,
            config.seckill.cache.clone(),
        );

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            materializer: Arc::new(materializer),
            sale_opener,
            shops,
            channel,
            shutdown_tx,
            consumer: None,
        })
    }

    /// Pre-warm hot shops and start the order consumer.
    ///
    /// # Errors
    ///
    /// Returns error if a hot shop cannot be loaded into the cache.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let logical_ttl = self.config.seckill.cache.logical_ttl();
        for &id in &self.config.warm_shop_ids {
            let warmed = self
                .shops
                .warm(ShopId(id), logical_ttl)
                .await
                .with_context(|| format!("Failed to warm shop {id}"))?;
            if warmed.is_none() {
                tracing::warn!(shop_id = id, "Hot shop not found, skipping warm-up");
            }
        }

        let consumer = OrderConsumer::new(
            "order-materializer",
            Arc::clone(&self.channel),
            Arc::clone(&self.materializer) as Arc<dyn OrderHandler>,
            self.shutdown_tx.subscribe(),
        );
        self.consumer = Some(consumer.spawn());
        tracing::info!(topic = %self.config.redpanda.topic, "Order consumer running");
        Ok(())
    }

    /// Register a voucher and seed the gate.
    ///
    /// # Errors
    ///
    /// Propagates validation, database and coordination-store errors.
    pub async fn open_sale(&self, voucher: &SeckillVoucher) -> seckill_core::Result<()> {
        self.sale_opener.open_sale(voucher).await
    }

    /// The purchase entry point.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// The shop cache guard.
    #[must_use]
    pub const fn shops(&self) -> &ShopCache {
        &self.shops
    }

    /// Signal the consumer to stop and wait up to the configured timeout.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());

        let Some(handle) = self.consumer.take() else {
            return;
        };
        match tokio::time::timeout(self.config.shutdown_timeout(), handle).await {
            Ok(Ok(())) => tracing::info!("Order consumer stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Order consumer task failed"),
            Err(_) => tracing::warn!(
                timeout_secs = self.config.shutdown_timeout_secs,
                "Order consumer did not stop in time"
            ),
        }
    }
}
