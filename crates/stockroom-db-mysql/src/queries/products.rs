//! Product listing queries.
//!
//! Listing is cursor-paginated: rows are filtered to `id > cursor`, ordered
//! by the whitelisted sort column with `id` as tiebreak, and fetched one row
//! past the requested limit so the caller can tell whether a next page
//! exists. The count query applies the same filter predicate without the
//! cursor condition.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_mysql::MySqlPool;

use stockroom_core::{CoreError, Product, ProductFilters};

/// Row tuple shape shared by listing queries.
type ProductRow = (
    i64,
    String,
    Option<String>,
    String,
    f64,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// The catalog columns every listing query selects.
///
/// `price` is DECIMAL(10,2) in MySQL; it is cast to DOUBLE here so rows
/// decode as `f64` without a decimal type in the wire model.
const SELECT_COLUMNS: &str = "id, name, description, category, \
     CAST(price AS DOUBLE) AS price, stock, created_at, updated_at";

/// Appends the AND-combined filter predicate shared by the listing and
/// count queries. Bind order: category, min_price, max_price, search twice
/// (name, description).
fn push_filter_sql(sql: &mut String, filters: &ProductFilters) {
    if filters.category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if filters.min_price.is_some() {
        sql.push_str(" AND price >= ?");
    }
    if filters.max_price.is_some() {
        sql.push_str(" AND price <= ?");
    }
    if filters.search.is_some() {
        sql.push_str(" AND (name LIKE ? OR description LIKE ?)");
    }
}

/// Escapes LIKE wildcards so a search term matches as a literal substring.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

/// Fetches one page of products after the given cursor.
///
/// `fetch_limit` is the page size plus one; the caller truncates and derives
/// the next cursor from the overflow row.
pub async fn list_products(
    pool: &MySqlPool,
    filters: &ProductFilters,
    cursor: i64,
    fetch_limit: i64,
) -> Result<Vec<Product>, CoreError> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM products WHERE id > ?");
    push_filter_sql(&mut sql, filters);
    // The id tiebreak keeps the cursor well-defined when the sort column
    // has duplicate values.
    sql.push_str(&format!(
        " ORDER BY {} ASC, id ASC LIMIT ?",
        filters.sort_by.as_str()
    ));

    let mut q = query_as::<_, ProductRow>(&sql).bind(cursor);
    if let Some(ref category) = filters.category {
        q = q.bind(category.clone());
    }
    if let Some(min) = filters.min_price {
        q = q.bind(min);
    }
    if let Some(max) = filters.max_price {
        q = q.bind(max);
    }
    if let Some(ref search) = filters.search {
        let pattern = like_pattern(search);
        q = q.bind(pattern.clone()).bind(pattern);
    }

    let rows = q.bind(fetch_limit).fetch_all(pool).await.map_err(|e| {
        tracing::warn!(error = %e, sql = %sql, "Product listing query failed");
        CoreError::store_unavailable("mysql", format!("Listing query failed: {e}"))
    })?;

    Ok(rows.into_iter().map(row_to_product).collect())
}

/// Counts all products matching the filter predicate, ignoring the cursor.
///
/// Runs as a separate statement, so the total is not guaranteed consistent
/// with a page read concurrently.
pub async fn count_products(
    pool: &MySqlPool,
    filters: &ProductFilters,
) -> Result<i64, CoreError> {
    let mut sql = String::from("SELECT COUNT(*) FROM products WHERE 1=1");
    push_filter_sql(&mut sql, filters);

    let mut q = query_scalar::<_, i64>(&sql);
    if let Some(ref category) = filters.category {
        q = q.bind(category.clone());
    }
    if let Some(min) = filters.min_price {
        q = q.bind(min);
    }
    if let Some(max) = filters.max_price {
        q = q.bind(max);
    }
    if let Some(ref search) = filters.search {
        let pattern = like_pattern(search);
        q = q.bind(pattern.clone()).bind(pattern);
    }

    let total = q.fetch_one(pool).await.map_err(|e| {
        tracing::warn!(error = %e, "Product count query failed");
        CoreError::store_unavailable("mysql", format!("Count query failed: {e}"))
    })?;

    Ok(total)
}

/// Inserts a product row and returns its generated identity.
pub async fn insert_product(
    pool: &MySqlPool,
    name: &str,
    description: Option<&str>,
    category: &str,
    price: f64,
    stock: i32,
) -> Result<i64, CoreError> {
    let result = query(
        "INSERT INTO products (name, description, category, price, stock)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(description)
    .bind(category)
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await
    .map_err(|e| CoreError::store_unavailable("mysql", format!("Product insert failed: {e}")))?;

    Ok(result.last_insert_id() as i64)
}

fn row_to_product(row: ProductRow) -> Product {
    let (id, name, description, category, price, stock, created_at, updated_at) = row;
    Product {
        id,
        name,
        description,
        category,
        price,
        stock,
        created_at,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::SortColumn;

    #[test]
    fn test_filter_sql_assembly() {
        let filters = ProductFilters::new()
            .with_category("fruit")
            .with_price_range(Some(1.0), None)
            .with_search("apple");

        let mut sql = String::from("SELECT 1 FROM products WHERE id > ?");
        push_filter_sql(&mut sql, &filters);

        assert!(sql.contains("AND category = ?"));
        assert!(sql.contains("AND price >= ?"));
        assert!(!sql.contains("AND price <= ?"));
        assert!(sql.contains("AND (name LIKE ? OR description LIKE ?)"));
    }

    #[test]
    fn test_unfiltered_sql_has_no_predicates() {
        let mut sql = String::from("SELECT 1 FROM products WHERE id > ?");
        push_filter_sql(&mut sql, &ProductFilters::default());
        assert_eq!(sql, "SELECT 1 FROM products WHERE id > ?");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("apple"), "%apple%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn test_sort_column_is_whitelisted_in_order_by() {
        // The ORDER BY clause interpolates SortColumn::as_str, which only
        // produces the six known column names.
        for column in [
            SortColumn::Id,
            SortColumn::Name,
            SortColumn::Price,
            SortColumn::Category,
            SortColumn::Stock,
            SortColumn::CreatedAt,
        ] {
            assert!(!column.as_str().contains(' '));
            assert!(!column.as_str().contains(';'));
        }
    }
}
