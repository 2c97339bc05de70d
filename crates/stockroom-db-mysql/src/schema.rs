//! Schema management for the MySQL storage backend.
//!
//! This module creates the two tables the service owns: `products` (the
//! catalog) and `webhook_events` (the idempotency ledger). Bootstrap is
//! idempotent and safe to run from several instances at once; it is not a
//! migration system.

use sqlx_mysql::MySqlPool;
use tracing::{debug, info, instrument};

use crate::error::{MySqlError, Result, is_duplicate_index};

/// Table name for the product catalog.
pub const PRODUCTS_TABLE: &str = "products";

/// Table name for the webhook idempotency ledger.
pub const WEBHOOK_EVENTS_TABLE: &str = "webhook_events";

/// Manages the database schema for the catalog service.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    pool: MySqlPool,
}

impl SchemaManager {
    /// Creates a new `SchemaManager` with the given connection pool.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Ensures all tables and indexes exist.
    ///
    /// Safe to call on every startup. Tables use `CREATE TABLE IF NOT
    /// EXISTS`; index creation tolerates the duplicate-name error MySQL
    /// raises on re-runs, so concurrent bootstrap from multiple instances
    /// is harmless.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        self.create_products_table().await?;
        self.create_webhook_events_table().await?;
        info!("Database schema ready");
        Ok(())
    }

    /// Checks if a table exists in the current database.
    #[instrument(skip(self))]
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = sqlx_core::query_scalar::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(MySqlError::from)?;

        Ok(count > 0)
    }

    /// Creates the product catalog table and its indexes.
    #[instrument(skip(self))]
    async fn create_products_table(&self) -> Result<()> {
        // Table names can't be parameterized, so the DDL is formatted from
        // the crate-level constants.
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {PRODUCTS_TABLE} (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL,
                description TEXT,
                category VARCHAR(100) NOT NULL,
                price DECIMAL(10, 2) NOT NULL,
                stock INT NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            ) ENGINE=InnoDB
            "#
        );

        sqlx_core::query::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(MySqlError::from)?;

        self.create_index("idx_products_category_price", PRODUCTS_TABLE, "category, price")
            .await?;
        self.create_index("idx_products_price_created", PRODUCTS_TABLE, "price, created_at")
            .await?;
        self.create_index("idx_products_created_cursor", PRODUCTS_TABLE, "created_at, id")
            .await?;
        self.create_index("idx_products_name", PRODUCTS_TABLE, "name")
            .await?;

        debug!("products table ready");
        Ok(())
    }

    /// Creates the webhook idempotency ledger table and its indexes.
    ///
    /// The primary key on the caller-supplied event id is load-bearing: a
    /// duplicate delivery that slips past the key-value marker is rejected
    /// here.
    #[instrument(skip(self))]
    async fn create_webhook_events_table(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {WEBHOOK_EVENTS_TABLE} (
                id VARCHAR(255) PRIMARY KEY,
                event_type VARCHAR(100) NOT NULL,
                payload JSON,
                processed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB
            "#
        );

        sqlx_core::query::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(MySqlError::from)?;

        self.create_index("idx_webhook_events_type", WEBHOOK_EVENTS_TABLE, "event_type")
            .await?;
        self.create_index("idx_webhook_events_created", WEBHOOK_EVENTS_TABLE, "created_at")
            .await?;

        debug!("webhook_events table ready");
        Ok(())
    }

    /// Creates an index, tolerating the duplicate-name error on re-runs.
    ///
    /// MySQL has no `CREATE INDEX IF NOT EXISTS`.
    async fn create_index(&self, name: &str, table: &str, columns: &str) -> Result<()> {
        let sql = format!("CREATE INDEX {name} ON {table} ({columns})");

        match sqlx_core::query::query(&sql).execute(&self.pool).await {
            Ok(_) => {
                debug!(index = %name, "Created index");
                Ok(())
            }
            Err(e) if is_duplicate_index(&e) => {
                debug!(index = %name, "Index already exists");
                Ok(())
            }
            Err(e) => Err(MySqlError::from(e)),
        }
    }
}
