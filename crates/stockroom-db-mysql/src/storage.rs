//! MySQL-backed catalog storage.

use sqlx_mysql::MySqlPool;

use stockroom_core::{CoreError, Product, ProductFilters, WebhookEvent};

use crate::config::MySqlConfig;
use crate::pool;
use crate::queries;
use crate::schema::SchemaManager;

/// MySQL storage backend for the product catalog and webhook ledger.
///
/// Thin facade over a connection pool; all SQL lives in the [`queries`]
/// modules.
#[derive(Debug, Clone)]
pub struct MySqlStorage {
    pool: MySqlPool,
}

impl MySqlStorage {
    /// Creates a new `MySqlStorage` with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Bootstrap the schema (if configured)
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if schema bootstrap fails.
    pub async fn new(config: MySqlConfig) -> Result<Self, CoreError> {
        let pool = pool::create_pool(&config).await?;

        if config.bootstrap_schema {
            SchemaManager::new(pool.clone()).ensure_schema().await?;
        }

        Ok(Self { pool })
    }

    /// Creates a new `MySqlStorage` from an existing connection pool.
    ///
    /// This allows sharing a connection pool between multiple components.
    /// Schema bootstrap is not run automatically when using this constructor.
    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Fetches a page of products after `cursor`, ordered by the filter's
    /// sort column with the identity tiebreak. `fetch_limit` is the page
    /// size plus one so the caller can detect a next page.
    pub async fn list_products(
        &self,
        filters: &ProductFilters,
        cursor: i64,
        fetch_limit: i64,
    ) -> Result<Vec<Product>, CoreError> {
        queries::products::list_products(&self.pool, filters, cursor, fetch_limit).await
    }

    /// Counts products matching the filters, ignoring the cursor.
    pub async fn count_products(&self, filters: &ProductFilters) -> Result<i64, CoreError> {
        queries::products::count_products(&self.pool, filters).await
    }

    /// Inserts a product and returns its generated identity.
    pub async fn insert_product(
        &self,
        name: &str,
        description: Option<&str>,
        category: &str,
        price: f64,
        stock: i32,
    ) -> Result<i64, CoreError> {
        queries::products::insert_product(&self.pool, name, description, category, price, stock)
            .await
    }

    /// Records a processed webhook event. Returns `Ok(false)` when the
    /// event id was already recorded.
    pub async fn record_event(&self, event: &WebhookEvent) -> Result<bool, CoreError> {
        queries::webhooks::insert_event(&self.pool, event).await
    }

    /// Reports whether an event id has been recorded.
    pub async fn event_exists(&self, event_id: &str) -> Result<bool, CoreError> {
        queries::webhooks::event_exists(&self.pool, event_id).await
    }

    /// Verifies the database is reachable.
    pub async fn health_check(&self) -> Result<(), CoreError> {
        pool::test_connection(&self.pool).await.map_err(CoreError::from)
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        pool::close_pool(&self.pool).await;
    }
}
