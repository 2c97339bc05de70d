//! Product listing with a cache-aside read path.
//!
//! Pages are cached under a key derived from every normalized query field.
//! A hit skips MySQL entirely; on a miss the page is read with one extra
//! row to detect whether a next page exists, then written back with a
//! short TTL. Cache trouble on either path is logged and swallowed, the
//! database stays the source of truth.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use stockroom_core::{ProductFilters, ProductPage, Result, SortColumn};
use stockroom_db_mysql::MySqlStorage;

use crate::kv::DynKeyValueClient;

const LISTING_TTL: Duration = Duration::from_secs(300);
const DEFAULT_LIMIT: i64 = 20;
const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 100;

/// Listing query parameters as they arrive on the wire.
///
/// Everything is an optional string; normalization decides what malformed
/// values mean instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

/// Normalized listing query: validated filters, a non-negative cursor and
/// a clamped page size.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub filters: ProductFilters,
    pub cursor: i64,
    pub limit: i64,
}

impl ListingQuery {
    /// Normalizes raw parameters:
    ///
    /// - `limit` is clamped to [1,100]; unparseable values fall back to 20
    /// - `cursor` defaults to 0; unparseable or negative values become 0
    /// - empty strings count as absent filters
    /// - unknown sort columns fall back to `id`
    /// - unparseable price bounds are ignored
    #[must_use]
    pub fn from_params(params: &ListingParams) -> Self {
        let limit = parse_opt::<i64>(&params.limit)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(MIN_LIMIT, MAX_LIMIT);
        let cursor = parse_opt::<i64>(&params.cursor).unwrap_or(0).max(0);

        let sort_by = params
            .sort_by
            .as_deref()
            .and_then(SortColumn::parse)
            .unwrap_or_default();

        let filters = ProductFilters {
            category: non_empty(&params.category),
            min_price: parse_opt::<f64>(&params.min_price),
            max_price: parse_opt::<f64>(&params.max_price),
            search: non_empty(&params.search),
            sort_by,
        };

        Self {
            filters,
            cursor,
            limit,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_opt<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|s| s.trim().parse().ok())
}

/// Escapes the key delimiter so distinct queries never render the same key.
fn encode_field(field: &str) -> String {
    field.replace('\\', "\\\\").replace(':', "\\:")
}

fn encode_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Cache key covering every field that affects the page contents.
fn cache_key(query: &ListingQuery) -> String {
    let f = &query.filters;
    format!(
        "products:cat={}:min={}:max={}:q={}:sort={}:cur={}:lim={}",
        encode_field(f.category.as_deref().unwrap_or_default()),
        encode_f64(f.min_price),
        encode_f64(f.max_price),
        encode_field(f.search.as_deref().unwrap_or_default()),
        f.sort_by.as_str(),
        query.cursor,
        query.limit,
    )
}

/// Cache-aside facade over the product table.
#[derive(Clone)]
pub struct ListingService {
    storage: Arc<MySqlStorage>,
    kv: DynKeyValueClient,
}

impl ListingService {
    #[must_use]
    pub fn new(storage: Arc<MySqlStorage>, kv: DynKeyValueClient) -> Self {
        Self { storage, kv }
    }

    /// Returns one page of products for the normalized query.
    pub async fn list(&self, query: &ListingQuery) -> Result<ProductPage> {
        let key = cache_key(query);

        if let Some(page) = self.cached_page(&key).await {
            return Ok(page);
        }

        let page = self.query_page(query).await?;
        self.store_page(&key, &page).await;
        Ok(page)
    }

    async fn cached_page(&self, key: &str) -> Option<ProductPage> {
        match self.kv.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(page) => {
                    tracing::debug!(key = %key, "Listing cache hit");
                    Some(page)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cached page");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Listing cache read failed");
                None
            }
        }
    }

    async fn query_page(&self, query: &ListingQuery) -> Result<ProductPage> {
        // One row past the limit tells us whether a next page exists.
        let mut rows = self
            .storage
            .list_products(&query.filters, query.cursor, query.limit + 1)
            .await?;

        let has_more = rows.len() as i64 > query.limit;
        if has_more {
            rows.truncate(query.limit as usize);
        }
        let cursor = if has_more {
            rows.last().map(|p| p.id)
        } else {
            None
        };

        let total = self.storage.count_products(&query.filters).await?;

        Ok(ProductPage {
            count: rows.len(),
            data: rows,
            cursor,
            has_more,
            total,
        })
    }

    async fn store_page(&self, key: &str, page: &ProductPage) {
        let json = match serde_json::to_string(page) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode page for caching");
                return;
            }
        };
        if let Err(e) = self.kv.set(key, &json, Some(LISTING_TTL)).await {
            tracing::warn!(key = %key, error = %e, "Listing cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>, cursor: Option<&str>) -> ListingParams {
        ListingParams {
            limit: limit.map(str::to_string),
            cursor: cursor.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_limit_defaults_to_twenty() {
        assert_eq!(ListingQuery::from_params(&params(None, None)).limit, 20);
        assert_eq!(
            ListingQuery::from_params(&params(Some("not-a-number"), None)).limit,
            20
        );
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(ListingQuery::from_params(&params(Some("0"), None)).limit, 1);
        assert_eq!(
            ListingQuery::from_params(&params(Some("101"), None)).limit,
            100
        );
        assert_eq!(
            ListingQuery::from_params(&params(Some("-5"), None)).limit,
            1
        );
        assert_eq!(
            ListingQuery::from_params(&params(Some("55"), None)).limit,
            55
        );
    }

    #[test]
    fn test_cursor_defaults_to_zero() {
        assert_eq!(ListingQuery::from_params(&params(None, None)).cursor, 0);
        assert_eq!(
            ListingQuery::from_params(&params(None, Some("junk"))).cursor,
            0
        );
        assert_eq!(
            ListingQuery::from_params(&params(None, Some("-3"))).cursor,
            0
        );
        assert_eq!(
            ListingQuery::from_params(&params(None, Some("42"))).cursor,
            42
        );
    }

    #[test]
    fn test_empty_filters_are_absent() {
        let raw = ListingParams {
            category: Some(String::new()),
            search: Some(String::new()),
            ..Default::default()
        };
        let query = ListingQuery::from_params(&raw);
        assert_eq!(query.filters.category, None);
        assert_eq!(query.filters.search, None);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_id() {
        let raw = ListingParams {
            sort_by: Some("evil; DROP TABLE products".into()),
            ..Default::default()
        };
        assert_eq!(
            ListingQuery::from_params(&raw).filters.sort_by,
            SortColumn::Id
        );
    }

    #[test]
    fn test_price_bounds_parse_leniently() {
        let raw = ListingParams {
            min_price: Some("1.5".into()),
            max_price: Some("cheap".into()),
            ..Default::default()
        };
        let query = ListingQuery::from_params(&raw);
        assert_eq!(query.filters.min_price, Some(1.5));
        assert_eq!(query.filters.max_price, None);
    }

    #[test]
    fn test_cache_key_covers_all_fields() {
        let base = ListingQuery::from_params(&ListingParams::default());
        let mut other = base.clone();
        other.limit = 21;
        assert_ne!(cache_key(&base), cache_key(&other));

        let mut sorted = base.clone();
        sorted.filters.sort_by = SortColumn::Price;
        assert_ne!(cache_key(&base), cache_key(&sorted));
    }

    #[test]
    fn test_cache_key_delimiter_cannot_collide() {
        // A category containing the delimiter must not render the same key
        // as the equivalent split fields.
        let tricky = ListingQuery::from_params(&ListingParams {
            category: Some("fruit:min=1".into()),
            ..Default::default()
        });
        let plain = ListingQuery::from_params(&ListingParams {
            category: Some("fruit".into()),
            min_price: Some("1".into()),
            ..Default::default()
        });
        assert_ne!(cache_key(&tricky), cache_key(&plain));
    }
}
