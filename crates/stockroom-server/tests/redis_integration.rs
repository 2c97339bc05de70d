//! Integration tests for the Redis-backed key-value client.
//!
//! These tests verify the store operations the rest of the system is built
//! on: plain get/set, TTL expiry, atomic set-if-absent, and the distributed
//! lock and idempotency marker built from it.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::time::Duration;

use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

use stockroom_server::config::RedisConfig;
use stockroom_server::lock::DistributedLock;
use stockroom_server::{DynKeyValueClient, create_kv_client};

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_kv() -> DynKeyValueClient {
    let config = RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        pool_size: 5,
        timeout_ms: 5000,
    };
    create_kv_client(&config).await
}

#[tokio::test]
async fn test_get_set_delete() {
    let kv = redis_kv().await;

    assert_eq!(kv.get("it:missing").await.unwrap(), None);

    kv.set("it:plain", "value", None).await.unwrap();
    assert_eq!(
        kv.get("it:plain").await.unwrap(),
        Some("value".to_string())
    );

    assert!(kv.delete("it:plain").await.unwrap());
    assert!(!kv.delete("it:plain").await.unwrap());
    assert_eq!(kv.get("it:plain").await.unwrap(), None);
}

#[tokio::test]
async fn test_ttl_expiry() {
    let kv = redis_kv().await;

    kv.set("it:expiring", "value", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(kv.get("it:expiring").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(kv.get("it:expiring").await.unwrap(), None);
}

#[tokio::test]
async fn test_set_nx_is_atomic_across_clients() {
    // Two clients racing for the same key never both win.
    let a = redis_kv().await;
    let b = redis_kv().await;

    let first = a
        .set_nx("it:nx", "a", Duration::from_secs(30))
        .await
        .unwrap();
    let second = b
        .set_nx("it:nx", "b", Duration::from_secs(30))
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    assert_eq!(a.get("it:nx").await.unwrap(), Some("a".to_string()));

    a.delete("it:nx").await.unwrap();
}

#[tokio::test]
async fn test_distributed_lock_round_trip() {
    let kv = redis_kv().await;

    let holder = DistributedLock::new(kv.clone(), "it:lock", Duration::from_secs(30));
    let contender = DistributedLock::new(kv, "it:lock", Duration::from_secs(30));

    assert!(holder.try_acquire().await.unwrap());
    assert!(!contender.try_acquire().await.unwrap());

    holder.release().await.unwrap();
    assert!(contender.try_acquire().await.unwrap());
    contender.release().await.unwrap();
}

#[tokio::test]
async fn test_idempotency_marker_survives_duplicate_delivery() {
    let kv = redis_kv().await;
    let marker = "webhook:event:it-evt-1";

    let first = kv
        .set_nx(marker, "processed", Duration::from_secs(60))
        .await
        .unwrap();
    let replay = kv
        .set_nx(marker, "processed", Duration::from_secs(60))
        .await
        .unwrap();

    assert!(first);
    assert!(!replay);

    kv.delete(marker).await.unwrap();
}

#[tokio::test]
async fn test_graceful_degradation_invalid_url() {
    let config = RedisConfig {
        enabled: true,
        url: "redis://nonexistent:9999".to_string(),
        pool_size: 5,
        timeout_ms: 1000,
    };

    // Should fall back to the in-memory store and keep working.
    let kv = create_kv_client(&config).await;
    kv.set("it:fallback", "value", None).await.unwrap();
    assert_eq!(
        kv.get("it:fallback").await.unwrap(),
        Some("value".to_string())
    );
}

#[tokio::test]
async fn test_disabled_redis_uses_memory_store() {
    let config = RedisConfig {
        enabled: false,
        url: "redis://localhost:6379".to_string(),
        pool_size: 5,
        timeout_ms: 5000,
    };

    let kv = create_kv_client(&config).await;
    assert!(
        kv.set_nx("it:disabled", "1", Duration::from_secs(5))
            .await
            .unwrap()
    );
    assert!(
        !kv.set_nx("it:disabled", "2", Duration::from_secs(5))
            .await
            .unwrap()
    );
}
