use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single catalog row as stored in the relational system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: f64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of a cursor-paginated listing.
///
/// `cursor` carries the identity of the last row in `data` when more rows
/// remain, and is `None` on the final page. `total` counts all rows matching
/// the filter (independent of the cursor); `count` is the size of this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub cursor: Option<i64>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub total: i64,
    pub count: usize,
}

impl ProductPage {
    /// An empty final page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            cursor: None,
            has_more: false,
            total: 0,
            count: 0,
        }
    }
}

/// Columns a listing may be ordered by.
///
/// This is a closed set: the column name is interpolated into SQL, so
/// anything outside it is replaced by the default rather than passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Id,
    Name,
    Price,
    Category,
    Stock,
    CreatedAt,
}

impl SortColumn {
    /// The SQL column name this variant maps to.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Price => "price",
            Self::Category => "category",
            Self::Stock => "stock",
            Self::CreatedAt => "created_at",
        }
    }

    /// Parse a caller-supplied column name; `None` for anything off the whitelist.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            "category" => Some(Self::Category),
            "stock" => Some(Self::Stock),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter predicate for a product listing.
///
/// All fields are AND-combined: exact match on category, substring match on
/// name/description, inclusive range match on price.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductFilters {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: SortColumn,
}

impl ProductFilters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn with_sort_by(mut self, sort_by: SortColumn) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// True when no filter narrows the result set.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.search.is_none()
    }
}

/// An inbound webhook delivery, keyed by the caller-supplied event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Value,
    pub processed_at: DateTime<Utc>,
}

impl WebhookEvent {
    #[must_use]
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            processed_at: Utc::now(),
        }
    }
}

/// Outcome of an idempotent ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed,
    AlreadyProcessed,
}

impl IngestOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::AlreadyProcessed => "already_processed",
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyProcessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_product(id: i64) -> Product {
        Product {
            id,
            name: format!("product-{id}"),
            description: None,
            category: "fruit".to_string(),
            price: 1.25,
            stock: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_sort_column_whitelist() {
        assert_eq!(SortColumn::parse("id"), Some(SortColumn::Id));
        assert_eq!(SortColumn::parse("name"), Some(SortColumn::Name));
        assert_eq!(SortColumn::parse("price"), Some(SortColumn::Price));
        assert_eq!(SortColumn::parse("category"), Some(SortColumn::Category));
        assert_eq!(SortColumn::parse("stock"), Some(SortColumn::Stock));
        assert_eq!(SortColumn::parse("created_at"), Some(SortColumn::CreatedAt));

        assert_eq!(SortColumn::parse("id; DROP TABLE products"), None);
        assert_eq!(SortColumn::parse("PRICE"), None);
        assert_eq!(SortColumn::parse(""), None);
    }

    #[test]
    fn test_sort_column_default_is_identity() {
        assert_eq!(SortColumn::default(), SortColumn::Id);
        assert_eq!(SortColumn::default().as_str(), "id");
    }

    #[test]
    fn test_page_serializes_wire_field_names() {
        let page = ProductPage {
            data: vec![sample_product(5)],
            cursor: Some(5),
            has_more: true,
            total: 3,
            count: 1,
        };

        let value = serde_json::to_value(&page).unwrap();
        assert!(value.get("hasMore").is_some());
        assert!(value.get("has_more").is_none());
        assert_eq!(value["cursor"], json!(5));
        assert_eq!(value["count"], json!(1));
    }

    #[test]
    fn test_final_page_cursor_is_null() {
        let page = ProductPage::empty();
        let value = serde_json::to_value(&page).unwrap();
        assert!(value["cursor"].is_null());
        assert_eq!(value["hasMore"], json!(false));
    }

    #[test]
    fn test_filters_builder() {
        let filters = ProductFilters::new()
            .with_category("fruit")
            .with_price_range(Some(1.0), Some(5.0))
            .with_search("apple")
            .with_sort_by(SortColumn::Price);

        assert_eq!(filters.category.as_deref(), Some("fruit"));
        assert_eq!(filters.min_price, Some(1.0));
        assert_eq!(filters.max_price, Some(5.0));
        assert_eq!(filters.search.as_deref(), Some("apple"));
        assert_eq!(filters.sort_by, SortColumn::Price);
        assert!(!filters.is_unfiltered());
    }

    #[test]
    fn test_default_filters_are_unfiltered() {
        let filters = ProductFilters::default();
        assert!(filters.is_unfiltered());
        assert_eq!(filters.sort_by, SortColumn::Id);
    }

    #[test]
    fn test_ingest_outcome_wire_format() {
        assert_eq!(
            serde_json::to_value(IngestOutcome::Processed).unwrap(),
            json!("processed")
        );
        assert_eq!(
            serde_json::to_value(IngestOutcome::AlreadyProcessed).unwrap(),
            json!("already_processed")
        );
        assert_eq!(IngestOutcome::AlreadyProcessed.as_str(), "already_processed");
        assert!(IngestOutcome::AlreadyProcessed.is_duplicate());
        assert!(!IngestOutcome::Processed.is_duplicate());
    }

    #[test]
    fn test_webhook_event_construction() {
        let event = WebhookEvent::new("evt-1", "order.created", json!({"orderId": 42}));
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.event_type, "order.created");
        assert_eq!(event.payload["orderId"], json!(42));
    }
}
