//! Cache guard behaviour over the in-memory coordinator and repository.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use seckill_core::config::CacheConfig;
use seckill_core::environment::Clock;
use seckill_core::providers::CacheStore;
use seckill_core::{SeckillError, Shop, ShopId};
use seckill_runtime::CacheGuard;
use seckill_testing::fixtures::sample_shop;
use seckill_testing::{InMemoryCoordinator, InMemoryEntityRepository, ManualClock};
use std::sync::Arc;
use std::time::Duration;

type ShopGuard = CacheGuard<Shop, InMemoryCoordinator, InMemoryEntityRepository<Shop>>;

struct Fixture {
    store: Arc<InMemoryCoordinator>,
    repository: Arc<InMemoryEntityRepository<Shop>>,
    clock: Arc<ManualClock>,
    guard: ShopGuard,
}

fn fixture(repository: InMemoryEntityRepository<Shop>, config: CacheConfig) -> Fixture {
    let store = Arc::new(InMemoryCoordinator::new());
    let repository = Arc::new(repository);
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let guard = CacheGuard::for_shops(
        Arc::clone(&store),
        Arc::clone(&repository),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config,
    );
    Fixture {
        store,
        repository,
        clock,
        guard,
    }
}

fn with_shop(id: i64) -> InMemoryEntityRepository<Shop> {
    let repository = InMemoryEntityRepository::new();
    repository.insert(sample_shop(id));
    repository
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn hit_after_first_load() {
    let f = fixture(with_shop(1), CacheConfig::default());

    let first = f.guard.read(ShopId(1)).await.unwrap();
    let second = f.guard.read(ShopId(1)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.unwrap().id, ShopId(1));
    assert_eq!(f.repository.loads(), 1);
}

#[tokio::test]
async fn missing_entity_is_tombstoned() {
    let f = fixture(InMemoryEntityRepository::new(), CacheConfig::default());

    for _ in 0..10 {
        assert!(f.guard.read(ShopId(404)).await.unwrap().is_none());
    }

    assert_eq!(f.repository.loads(), 1);
    assert_eq!(f.store.raw_get("cache:shop:404").as_deref(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn tombstone_expires_after_its_short_ttl() {
    let f = fixture(InMemoryEntityRepository::new(), CacheConfig::default());
    assert!(f.guard.read(ShopId(5)).await.unwrap().is_none());

    f.repository.insert(sample_shop(5));
    assert!(f.guard.read(ShopId(5)).await.unwrap().is_none());

    tokio::time::advance(CacheConfig::default().null_ttl() + Duration::from_secs(1)).await;
    assert!(f.guard.read(ShopId(5)).await.unwrap().is_some());
    assert_eq!(f.repository.loads(), 2);
}

#[tokio::test]
async fn undecodable_payload_is_a_miss_and_gets_overwritten() {
    let f = fixture(with_shop(1), CacheConfig::default());
    f.store.raw_set("cache:shop:1", "{\"id\":");

    let shop = f.guard.read(ShopId(1)).await.unwrap();

    assert!(shop.is_some());
    assert_eq!(f.repository.loads(), 1);
    let repaired = f.store.raw_get("cache:shop:1").unwrap();
    assert!(serde_json::from_str::<Shop>(&repaired).is_ok());
}

#[tokio::test]
async fn mutex_read_loads_exactly_once_under_concurrency() {
    let repository = with_shop(1).with_load_delay(Duration::from_millis(50));
    let f = fixture(repository, CacheConfig::default());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let guard = f.guard.clone();
            tokio::spawn(async move { guard.read_with_mutex(ShopId(1)).await })
        })
        .collect();

    for handle in handles {
        let shop = handle.await.unwrap().unwrap();
        assert_eq!(shop.map(|s| s.id), Some(ShopId(1)));
    }
    assert_eq!(f.repository.loads(), 1);
    assert_eq!(f.store.raw_get("lock:shop:1"), None);
}

#[tokio::test]
async fn concurrent_reads_of_missing_entity_hit_the_store_once() {
    let repository = InMemoryEntityRepository::new().with_load_delay(Duration::from_millis(50));
    let f = fixture(repository, CacheConfig::default());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let guard = f.guard.clone();
            tokio::spawn(async move { guard.read_with_mutex(ShopId(404)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_none());
    }
    assert_eq!(f.repository.loads(), 1);
    assert_eq!(f.store.raw_get("cache:shop:404").as_deref(), Some(""));
}

#[tokio::test]
async fn cancelled_lock_holder_releases_the_lock() {
    let repository = with_shop(1).with_load_delay(Duration::from_millis(300));
    let f = fixture(repository, CacheConfig::default());

    let guard = f.guard.clone();
    let holder = tokio::spawn(async move { guard.read_with_mutex(ShopId(1)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.store.raw_get("lock:shop:1").as_deref(), Some("1"));

    holder.abort();
    assert!(holder.await.unwrap_err().is_cancelled());

    let store = Arc::clone(&f.store);
    wait_for(move || store.raw_get("lock:shop:1").is_none()).await;
    assert_eq!(f.store.raw_get("lock:shop:1"), None);

    let shop = f.guard.read_with_mutex(ShopId(1)).await.unwrap();
    assert_eq!(shop.map(|s| s.id), Some(ShopId(1)));
}

#[tokio::test]
async fn mutex_read_tombstones_missing_entities() {
    let f = fixture(InMemoryEntityRepository::new(), CacheConfig::default());

    assert!(f.guard.read_with_mutex(ShopId(9)).await.unwrap().is_none());
    assert!(f.guard.read_with_mutex(ShopId(9)).await.unwrap().is_none());
    assert_eq!(f.repository.loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn mutex_read_gives_up_after_bounded_attempts() {
    let config = CacheConfig::default().with_lock_retry(3, Duration::from_millis(10));
    let f = fixture(with_shop(1), config);
    f.store
        .set_if_absent("lock:shop:1", "1", Duration::from_secs(60))
        .await
        .unwrap();

    let err = f.guard.read_with_mutex(ShopId(1)).await.unwrap_err();

    assert!(matches!(err, SeckillError::CacheLockContention { ref key } if key == "lock:shop:1"));
    assert_eq!(f.repository.loads(), 0);
}

#[tokio::test(start_paused = true)]
async fn mutex_read_recovers_once_a_stale_lock_expires() {
    let config = CacheConfig::default().with_lock_retry(20, Duration::from_millis(500));
    let f = fixture(with_shop(1), config);
    f.store
        .set_if_absent("lock:shop:1", "1", Duration::from_secs(1))
        .await
        .unwrap();

    let shop = f.guard.read_with_mutex(ShopId(1)).await.unwrap();

    assert!(shop.is_some());
    assert_eq!(f.repository.loads(), 1);
}

#[tokio::test]
async fn logical_read_misses_until_warmed() {
    let f = fixture(with_shop(1), CacheConfig::default());

    assert!(f.guard.read_with_logical_expiry(ShopId(1)).await.unwrap().is_none());
    assert_eq!(f.repository.loads(), 0);

    f.guard.warm(ShopId(1), Duration::from_secs(10)).await.unwrap();
    let shop = f.guard.read_with_logical_expiry(ShopId(1)).await.unwrap();
    assert_eq!(shop.map(|s| s.id), Some(ShopId(1)));
    assert_eq!(f.repository.loads(), 1);
}

#[tokio::test]
async fn logical_read_serves_stale_and_rebuilds_once() {
    let repository = with_shop(1).with_load_delay(Duration::from_millis(100));
    let f = fixture(repository, CacheConfig::default());
    f.guard.warm(ShopId(1), Duration::from_secs(10)).await.unwrap();
    assert_eq!(f.repository.loads(), 1);

    let mut renamed = sample_shop(1);
    renamed.name = "Renamed".to_string();
    f.repository.insert(renamed);
    f.clock.advance(chrono::Duration::seconds(11));

    let started = tokio::time::Instant::now();
    let handles: Vec<_> = (0..50)
        .map(|_| {
            let guard = f.guard.clone();
            tokio::spawn(async move { guard.read_with_logical_expiry(ShopId(1)).await })
        })
        .collect();
    for handle in handles {
        let stale = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(stale.name, "Tea House 1");
    }
    // Nobody waited for the 100ms reload.
    assert!(started.elapsed() < Duration::from_millis(100));

    let store = Arc::clone(&f.store);
    wait_for(move || store.raw_get("lock:shop:1").is_none()).await;

    assert_eq!(f.repository.loads(), 2);
    let fresh = f.guard.read_with_logical_expiry(ShopId(1)).await.unwrap().unwrap();
    assert_eq!(fresh.name, "Renamed");
}

#[tokio::test]
async fn logical_rebuild_of_deleted_entity_drops_the_entry() {
    let f = fixture(with_shop(1), CacheConfig::default());
    f.guard.warm(ShopId(1), Duration::from_secs(10)).await.unwrap();
    f.repository.remove(ShopId(1));
    f.clock.advance(chrono::Duration::seconds(11));

    // Stale value served while the rebuild finds nothing.
    assert!(f.guard.read_with_logical_expiry(ShopId(1)).await.unwrap().is_some());

    let store = Arc::clone(&f.store);
    wait_for(move || store.raw_get("lock:shop:1").is_none()).await;
    assert_eq!(f.store.raw_get("cache:shop:1"), None);
    assert_eq!(f.repository.loads(), 2);

    assert!(f.guard.read_with_logical_expiry(ShopId(1)).await.unwrap().is_none());
    assert_eq!(f.repository.loads(), 2);
}

#[tokio::test]
async fn update_writes_store_then_invalidates() {
    let f = fixture(with_shop(1), CacheConfig::default());
    f.guard.read(ShopId(1)).await.unwrap();
    assert!(f.store.raw_get("cache:shop:1").is_some());

    let mut shop = sample_shop(1);
    shop.name = "New Name".to_string();
    f.guard.update(&shop).await.unwrap();

    assert_eq!(f.store.raw_get("cache:shop:1"), None);
    assert_eq!(f.guard.read(ShopId(1)).await.unwrap().unwrap().name, "New Name");
}

#[tokio::test]
async fn failed_store_write_leaves_cache_alone() {
    let f = fixture(with_shop(1), CacheConfig::default());
    f.guard.read(ShopId(1)).await.unwrap();

    let err = f.guard.update(&sample_shop(2)).await.unwrap_err();

    assert!(matches!(err, SeckillError::InvalidInput(_)));
    assert!(f.store.raw_get("cache:shop:1").is_some());
}

#[tokio::test]
async fn cache_outage_is_reported() {
    let f = fixture(with_shop(1), CacheConfig::default());
    f.store.set_unavailable(true);

    let err = f.guard.read(ShopId(1)).await.unwrap_err();
    assert!(matches!(err, SeckillError::CoordinationStoreUnavailable(_)));
}
