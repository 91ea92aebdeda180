//! Paginated query execution and row mapping.
//!
//! Runs the bounded listing query (inside a transaction with a statement
//! timeout) and the distinct-product count query, then flattens the
//! delimiter-encoded aggregate columns into the structured listing shape.
//! The encoding is a storage-layer convenience; decoding stays isolated in
//! [`decode_spec_aggregate`].

use super::builder::CatalogQueryBuilder;
use super::types::{ProductListing, SpecValue};
use crate::error::CatalogResult;
use sqlx::PgPool;
use std::time::Duration;

/// Flat row shape produced by the listing query.
#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: i64,
    name: String,
    sku: String,
    price: f64,
    discount: f64,
    quantity: i64,
    description: Option<String>,
    category_id: i64,
    brand_id: i64,
    created: i64,
    category_name: String,
    brand_name: String,
    rating: Option<f64>,
    /// Delimiter-encoded specification aggregate; NULL when the product
    /// has no specifications.
    specs: Option<String>,
    image: Option<String>,
}

impl ListingRow {
    /// Map the flat row into the nested listing shape. Pure; empty or
    /// absent aggregates map to empty lists, never errors.
    fn into_listing(self) -> ProductListing {
        let specs = self
            .specs
            .as_deref()
            .map(decode_spec_aggregate)
            .unwrap_or_default();

        ProductListing {
            id: self.id,
            name: self.name,
            sku: self.sku,
            price: self.price,
            discount: self.discount,
            quantity: self.quantity,
            description: self.description,
            category_id: self.category_id,
            category_name: self.category_name,
            brand_id: self.brand_id,
            brand_name: self.brand_name,
            rating: self.rating,
            image: self.image,
            specs,
            created: self.created,
        }
    }
}

/// Execute the bounded, sorted listing query for one page.
///
/// Runs inside a transaction so `SET LOCAL statement_timeout` applies to
/// this statement only and resets on commit.
pub async fn fetch_page(
    pool: &PgPool,
    builder: &CatalogQueryBuilder<'_>,
    page: u32,
    per_page: u32,
    statement_timeout: Duration,
) -> CatalogResult<Vec<ProductListing>> {
    let (sql, values) = builder.build_page(page, per_page);

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "SET LOCAL statement_timeout = '{}ms'",
        statement_timeout.as_millis()
    ))
    .execute(&mut *tx)
    .await?;

    let rows = sqlx::query_as_with::<_, ListingRow, _>(&sql, values)
        .fetch_all(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(rows.into_iter().map(ListingRow::into_listing).collect())
}

/// Execute the count query over distinct product identity.
pub async fn fetch_count(pool: &PgPool, builder: &CatalogQueryBuilder<'_>) -> CatalogResult<u64> {
    let (sql, values) = builder.build_count();

    let total: i64 = sqlx::query_scalar_with(&sql, values).fetch_one(pool).await?;

    Ok(total.max(0) as u64)
}

/// Decode the `id:name:value:category_id` entries joined by `|` into
/// structured specification values.
///
/// Entries that do not parse are skipped: the aggregate is a secondary
/// display affordance and a malformed row must not fail the listing.
pub fn decode_spec_aggregate(raw: &str) -> Vec<SpecValue> {
    raw.split('|')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut head = entry.splitn(3, ':');
            let id = head.next()?.parse::<i64>().ok()?;
            let name = head.next()?;
            let rest = head.next()?;
            // category_id is the trailing numeric field; everything between
            // keeps any ':' the value itself contains.
            let (value, category_id) = rest.rsplit_once(':')?;
            let category_id = category_id.parse::<i64>().ok()?;
            if name.is_empty() {
                return None;
            }
            Some(SpecValue {
                id,
                name: name.to_string(),
                value: value.to_string(),
                category_id,
            })
        })
        .collect()
}
