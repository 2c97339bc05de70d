//! Error types for the MySQL storage backend.

use stockroom_core::CoreError;
use sqlx_core::error::Error as SqlxError;

/// MySQL SQLSTATE for integrity constraint violations (duplicate entry).
pub const MYSQL_INTEGRITY_VIOLATION: &str = "23000";

/// Checks if a sqlx error has a specific MySQL SQLSTATE code.
pub fn has_mysql_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is a duplicate-key violation (ER_DUP_ENTRY).
pub fn is_duplicate_entry(err: &SqlxError) -> bool {
    has_mysql_error_code(err, MYSQL_INTEGRITY_VIOLATION)
        || err.to_string().contains("Duplicate entry")
}

/// Checks if a sqlx error is a duplicate index name (ER_DUP_KEYNAME).
///
/// MySQL has no `CREATE INDEX IF NOT EXISTS`, so idempotent bootstrap
/// tolerates this error on re-runs.
pub fn is_duplicate_index(err: &SqlxError) -> bool {
    err.to_string().contains("Duplicate key name")
}

/// Errors specific to the MySQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum MySqlError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Schema bootstrap error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Pool error.
    #[error("Pool error: {message}")]
    Pool { message: String },
}

impl MySqlError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Creates a new schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

impl From<MySqlError> for CoreError {
    fn from(err: MySqlError) -> Self {
        match err {
            MySqlError::Connection(e) => CoreError::store_unavailable("mysql", e.to_string()),
            MySqlError::Schema(e) => CoreError::internal(format!("Schema error: {e}")),
            MySqlError::Config { message } => {
                CoreError::internal(format!("Configuration error: {message}"))
            }
            MySqlError::Pool { message } => {
                CoreError::store_unavailable("mysql", format!("Pool error: {message}"))
            }
        }
    }
}

/// Result type alias for MySQL operations.
pub type Result<T> = std::result::Result<T, MySqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MySqlError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));

        let err = MySqlError::pool("pool exhausted");
        assert!(err.to_string().contains("Pool error"));

        let err = MySqlError::schema("create table failed");
        assert!(err.to_string().contains("Schema error"));
    }

    #[test]
    fn test_conversion_to_core_error() {
        let db_err = MySqlError::config("test error");
        let core_err: CoreError = db_err.into();
        assert!(matches!(core_err, CoreError::Internal { .. }));

        let pool_err = MySqlError::pool("exhausted");
        let core_err: CoreError = pool_err.into();
        assert!(matches!(core_err, CoreError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_duplicate_entry_detection_on_non_database_errors() {
        assert!(!is_duplicate_entry(&SqlxError::RowNotFound));
        assert!(!is_duplicate_index(&SqlxError::RowNotFound));
    }
}
