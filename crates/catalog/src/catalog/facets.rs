//! Facet aggregation for the current filter context.
//!
//! The count/value set shown for a facet must reflect the result of
//! applying every filter *except* that facet's own selection — otherwise
//! selecting a value would immediately remove its siblings from the UI
//! with no way back. The aggregation is deliberately asymmetric:
//!
//! - categories and brands aggregate over the fully filtered set (their
//!   own selection included — users rarely de-select those while browsing)
//! - each specification name aggregates with its own selection excluded
//!   but every other active filter applied
//! - price floor/ceiling are computed over the status + category scope
//!   only, so the observed range never collapses to the selected one
//!
//! A naive "aggregate over the fully filtered set" for everything is an
//! easy, wrong simplification; this asymmetry is preserved on purpose.

use super::builder::{Brand, CatalogQueryBuilder, Category, Product};
use super::types::{FacetEntry, FacetSet, ResolvedFilter};
use crate::error::CatalogResult;
use sea_query::{
    Expr, Iden, JoinType, Order, PostgresQueryBuilder, Query, SelectStatement,
};
use sea_query_binder::SqlxBinder;
use sqlx::PgPool;

#[derive(Iden)]
enum Specification {
    Table,
    Id,
    Name,
    Value,
}

#[derive(Iden)]
enum ProductSpecification {
    Table,
    ProductId,
    SpecificationId,
}

/// Aggregates available facet values for one resolved filter.
pub struct FacetAggregator<'a> {
    pool: &'a PgPool,
    filter: &'a ResolvedFilter,
}

impl<'a> FacetAggregator<'a> {
    /// Create an aggregator over a resolved filter.
    pub fn new(pool: &'a PgPool, filter: &'a ResolvedFilter) -> Self {
        Self { pool, filter }
    }

    /// Compute the facet set. Each sub-aggregate degrades independently to
    /// empty on store failure — facets are a secondary UI affordance and a
    /// partial set beats failing the whole request.
    pub async fn aggregate(&self) -> FacetSet {
        let mut facets = FacetSet::default();

        match self.fetch_entries(brand_facet_query(self.filter)).await {
            Ok(brands) => facets.brands = brands,
            Err(e) => tracing::warn!(error = %e, "brand facet aggregation failed; degrading"),
        }

        match self.fetch_entries(category_facet_query(self.filter)).await {
            Ok(categories) => facets.categories = categories,
            Err(e) => {
                tracing::warn!(error = %e, "category facet aggregation failed; degrading");
            }
        }

        match self.fetch_specifications().await {
            Ok(specifications) => facets.specifications = specifications,
            Err(e) => {
                tracing::warn!(error = %e, "specification facet aggregation failed; degrading");
            }
        }

        match self.fetch_price_bounds().await {
            Ok((min, max)) => {
                facets.price_min = min;
                facets.price_max = max;
            }
            Err(e) => tracing::warn!(error = %e, "price bound aggregation failed; degrading"),
        }

        facets
    }

    async fn fetch_entries(&self, query: SelectStatement) -> CatalogResult<Vec<FacetEntry>> {
        let (sql, values) = query.build_sqlx(PostgresQueryBuilder);
        let rows: Vec<(i64, String)> = sqlx::query_as_with(&sql, values)
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| FacetEntry { id, name })
            .collect())
    }

    /// Specification name -> distinct available values.
    ///
    /// One query with every filter applied covers all unselected names;
    /// each *selected* name then gets its own query with that name's
    /// selection excluded, overriding the baseline so its sibling values
    /// stay visible.
    async fn fetch_specifications(
        &self,
    ) -> CatalogResult<std::collections::BTreeMap<String, std::collections::BTreeSet<String>>>
    {
        let selected: Vec<&String> = self
            .filter
            .request
            .specifications
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, _)| name)
            .collect();

        let mut map = std::collections::BTreeMap::new();

        let (sql, values) =
            spec_values_query(self.filter, None).build_sqlx(PostgresQueryBuilder);
        let rows: Vec<(String, String)> = sqlx::query_as_with(&sql, values)
            .fetch_all(self.pool)
            .await?;
        for (name, value) in rows {
            if selected.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
                continue;
            }
            map.entry(name)
                .or_insert_with(std::collections::BTreeSet::new)
                .insert(value);
        }

        for spec_name in selected {
            let (sql, values) = spec_values_query(self.filter, Some(spec_name))
                .build_sqlx(PostgresQueryBuilder);
            let rows: Vec<(String, String)> = sqlx::query_as_with(&sql, values)
                .fetch_all(self.pool)
                .await?;
            for (name, value) in rows {
                map.entry(name)
                    .or_insert_with(std::collections::BTreeSet::new)
                    .insert(value);
            }
        }

        Ok(map)
    }

    async fn fetch_price_bounds(&self) -> CatalogResult<(Option<f64>, Option<f64>)> {
        let builder = CatalogQueryBuilder::new(self.filter);
        let (sql, values) = builder.build_price_bounds();
        let bounds: (Option<f64>, Option<f64>) = sqlx::query_as_with(&sql, values)
            .fetch_one(self.pool)
            .await?;

        Ok(bounds)
    }
}

/// Distinct brands across the fully filtered product set.
fn brand_facet_query(filter: &ResolvedFilter) -> SelectStatement {
    let builder = CatalogQueryBuilder::new(filter);
    let mut query = Query::select();
    query
        .distinct()
        .columns([(Brand::Table, Brand::Id), (Brand::Table, Brand::Name)])
        .from(Product::Table)
        .join(
            JoinType::InnerJoin,
            Brand::Table,
            Expr::col((Brand::Table, Brand::Id)).equals((Product::Table, Product::BrandId)),
        )
        .and_where(
            Expr::col((Product::Table, Product::Id)).in_subquery(builder.matching_ids(None)),
        )
        .order_by((Brand::Table, Brand::Name), Order::Asc);
    query
}

/// Distinct categories across the fully filtered product set.
fn category_facet_query(filter: &ResolvedFilter) -> SelectStatement {
    let builder = CatalogQueryBuilder::new(filter);
    let mut query = Query::select();
    query
        .distinct()
        .columns([
            (Category::Table, Category::Id),
            (Category::Table, Category::Name),
        ])
        .from(Product::Table)
        .join(
            JoinType::InnerJoin,
            Category::Table,
            Expr::col((Category::Table, Category::Id))
                .equals((Product::Table, Product::CategoryId)),
        )
        .and_where(
            Expr::col((Product::Table, Product::Id)).in_subquery(builder.matching_ids(None)),
        )
        .order_by((Category::Table, Category::Name), Order::Asc);
    query
}

/// Distinct (name, value) pairs across the matching product set.
///
/// With `own_name` set, that specification's selection is excluded from
/// the matching set and only its values are returned.
fn spec_values_query(filter: &ResolvedFilter, own_name: Option<&str>) -> SelectStatement {
    let builder = CatalogQueryBuilder::new(filter);
    let mut query = Query::select();
    query
        .distinct()
        .columns([
            (Specification::Table, Specification::Name),
            (Specification::Table, Specification::Value),
        ])
        .from(ProductSpecification::Table)
        .join(
            JoinType::InnerJoin,
            Specification::Table,
            Expr::col((Specification::Table, Specification::Id)).equals((
                ProductSpecification::Table,
                ProductSpecification::SpecificationId,
            )),
        )
        .and_where(
            Expr::col((
                ProductSpecification::Table,
                ProductSpecification::ProductId,
            ))
            .in_subquery(builder.matching_ids(own_name)),
        )
        .order_by(
            (Specification::Table, Specification::Name),
            Order::Asc,
        )
        .order_by(
            (Specification::Table, Specification::Value),
            Order::Asc,
        );

    if let Some(name) = own_name {
        query.and_where(Expr::cust_with_values(
            "LOWER(specification.name) = LOWER($1)",
            [name],
        ));
    }

    query
}
