pub mod error;
pub mod types;

pub use error::{CoreError, ErrorCategory, Result};
pub use types::{
    IngestOutcome, Product, ProductFilters, ProductPage, SortColumn, WebhookEvent,
};
