use thiserror::Error;

/// Core error types for Stockroom operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// The key-value or relational store is unreachable.
    #[error("{store} unavailable: {message}")]
    StoreUnavailable { store: String, message: String },

    /// The upstream token issuer or data source is unreachable or timed out.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The caller supplied invalid input.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A contended resource could not be acquired within the bounded wait.
    #[error("Race lost for {resource}: gave up after {attempts} attempts")]
    RaceLost { resource: String, attempts: u32 },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a new StoreUnavailable error
    #[must_use]
    pub fn store_unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a new UpstreamUnavailable error
    #[must_use]
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Create a new InvalidInput error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new RaceLost error
    #[must_use]
    pub fn race_lost(resource: impl Into<String>, attempts: u32) -> Self {
        Self::RaceLost {
            resource: resource.into(),
            attempts,
        }
    }

    /// Create a new Internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a client error (4xx category)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Check if retrying the whole operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::UpstreamUnavailable { .. } | Self::RaceLost { .. }
        )
    }

    /// Get error category for logging/monitoring
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StoreUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::UpstreamUnavailable { .. } => ErrorCategory::Upstream,
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::RaceLost { .. } => ErrorCategory::Contention,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Infrastructure,
    Upstream,
    Validation,
    Contention,
    Serialization,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Upstream => write!(f, "upstream"),
            Self::Validation => write!(f, "validation"),
            Self::Contention => write!(f, "contention"),
            Self::Serialization => write!(f, "serialization"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
