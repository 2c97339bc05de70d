//! Server assembly: shared state, router, and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use stockroom_db_mysql::{MySqlConfig, MySqlStorage};

use crate::config::{AppConfig, MySqlStorageConfig};
use crate::create_kv_client;
use crate::external::ExternalDataClient;
use crate::handlers;
use crate::oauth::TokenCache;
use crate::products::ListingService;
use crate::webhooks::WebhookService;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub listings: ListingService,
    pub webhooks: WebhookService,
    pub external: ExternalDataClient,
    pub started_at: Instant,
}

/// Builds the API router on top of the shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/products", get(handlers::list_products))
        .route("/webhooks/event", post(handlers::ingest_webhook))
        .route("/external/data", get(handlers::external_data))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &axum::http::Request<_>| {
                        tracing::info_span!(
                            "http.request",
                            http.method = %req.method(),
                            http.target = %req.uri(),
                        )
                    })
                    .on_response(
                        |res: &axum::http::Response<_>,
                         latency: std::time::Duration,
                         _span: &tracing::Span| {
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        },
                    ),
            ),
        )
        .with_state(state)
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Connects the backing stores and assembles the server.
    pub async fn build(self) -> anyhow::Result<StockroomServer> {
        let addr = self.config.addr();

        let mysql_cfg = self
            .config
            .storage
            .mysql
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("storage.mysql config is required"))?;
        let storage = Arc::new(MySqlStorage::new(storage_config(mysql_cfg)).await?);
        tracing::info!(database = %mysql_cfg.database, "✓ Connected to MySQL");

        let kv = create_kv_client(&self.config.redis).await;

        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenCache::new(
            kv.clone(),
            http.clone(),
            self.config.oauth.clone(),
        ));
        let external = ExternalDataClient::new(tokens, http, self.config.oauth.clone());

        let state = AppState {
            listings: ListingService::new(storage.clone(), kv.clone()),
            webhooks: WebhookService::new(storage.clone(), kv),
            external,
            started_at: Instant::now(),
        };

        Ok(StockroomServer {
            addr,
            app: build_router(state),
            storage,
        })
    }
}

fn storage_config(config: &MySqlStorageConfig) -> MySqlConfig {
    MySqlConfig::new(config.connection_url())
        .with_pool_size(config.pool_size)
        .with_connect_timeout_ms(config.connect_timeout_ms)
        .with_idle_timeout_ms(config.idle_timeout_ms)
        .with_bootstrap_schema(config.bootstrap_schema)
}

pub struct StockroomServer {
    addr: SocketAddr,
    app: Router,
    storage: Arc<MySqlStorage>,
}

impl StockroomServer {
    /// Serves until a shutdown signal arrives, then closes the pools.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.storage.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
