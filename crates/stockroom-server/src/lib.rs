pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod kv;
pub mod lock;
pub mod oauth;
pub mod observability;
pub mod products;
pub mod server;
pub mod webhooks;

pub use config::{
    AppConfig, LoggingConfig, MySqlStorageConfig, OauthConfig, RedisConfig, ServerConfig,
    StorageConfig,
};
pub use error::ApiError;
pub use external::ExternalDataClient;
pub use kv::{DynKeyValueClient, KeyValueClient, MemoryKv, RedisKv};
pub use lock::DistributedLock;
pub use oauth::TokenCache;
pub use observability::{init_tracing, init_tracing_with_level};
pub use products::{ListingParams, ListingQuery, ListingService};
pub use server::{AppState, ServerBuilder, StockroomServer, build_router};
pub use webhooks::WebhookService;

/// Create a key-value client based on configuration.
///
/// ## Modes
///
/// - **Redis disabled**: Returns the in-process store (DashMap)
/// - **Redis enabled**: Attempts to connect to Redis, falls back to the
///   in-process store on failure
///
/// ## Graceful Degradation
///
/// A failed Redis connection does not prevent the server from starting:
/// caching and locking degrade to single-instance scope, while the event
/// ledger's unique key still holds idempotency across instances.
pub async fn create_kv_client(config: &RedisConfig) -> DynKeyValueClient {
    use std::sync::Arc;
    use std::time::Duration;

    if !config.enabled {
        tracing::info!("Redis disabled, using in-memory key-value store");
        return Arc::new(MemoryKv::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(deadpool_redis::PoolConfig::default);
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-memory store."
            );
            return Arc::new(MemoryKv::new());
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("✓ Connected to Redis successfully");
            Arc::new(RedisKv::new(pool))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-memory store."
            );
            Arc::new(MemoryKv::new())
        }
    }
}
