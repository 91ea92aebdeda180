//! Catalog query builder using SeaQuery.
//!
//! Generates parameterized SQL from a [`ResolvedFilter`] with support for:
//! - Optional predicates (each absent field contributes nothing)
//! - Dynamic specification facets via EXISTS sub-predicates
//! - Post-aggregation rating bounds (HAVING over the grouped mean)
//! - Deterministic sort policy with an explicit id tie-break
//! - Pagination

use super::types::{ResolvedFilter, SortKey};
use sea_query::{
    Alias, Cond, Expr, ExprTrait, Iden, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};
use sea_query_binder::{SqlxBinder, SqlxValues};

#[derive(Iden)]
pub(super) enum Product {
    Table,
    Id,
    Name,
    Sku,
    Price,
    Discount,
    Quantity,
    Description,
    CategoryId,
    BrandId,
    Created,
}

#[derive(Iden)]
pub(super) enum Category {
    Table,
    Id,
    Name,
    Status,
}

#[derive(Iden)]
pub(super) enum Brand {
    Table,
    Id,
    Name,
}

#[derive(Iden)]
pub(super) enum Review {
    Table,
    ProductId,
    Rating,
}

/// Longest specification name accepted as a filter key. Longer keys are
/// dropped from predicate construction, never truncated.
const MAX_SPEC_NAME_LEN: usize = 255;

/// Query builder for catalog listing queries.
///
/// Pure: holds a resolved filter and assembles statements; all values are
/// carried as bound parameters, never interpolated into query text.
pub struct CatalogQueryBuilder<'a> {
    filter: &'a ResolvedFilter,
}

impl<'a> CatalogQueryBuilder<'a> {
    /// Create a builder over a resolved filter.
    pub fn new(filter: &'a ResolvedFilter) -> Self {
        Self { filter }
    }

    /// Build the main SELECT with row shaping, sorting, and pagination.
    pub fn build_page(&self, page: u32, per_page: u32) -> (String, SqlxValues) {
        let mut query = self.filtered_select(None);

        query
            .columns([
                (Product::Table, Product::Id),
                (Product::Table, Product::Name),
                (Product::Table, Product::Sku),
                (Product::Table, Product::Price),
                (Product::Table, Product::Discount),
                (Product::Table, Product::Quantity),
                (Product::Table, Product::Description),
                (Product::Table, Product::CategoryId),
                (Product::Table, Product::BrandId),
                (Product::Table, Product::Created),
            ])
            .expr_as(
                Expr::col((Category::Table, Category::Name)),
                Alias::new("category_name"),
            )
            .expr_as(
                Expr::col((Brand::Table, Brand::Name)),
                Alias::new("brand_name"),
            )
            .expr_as(avg_rating_expr(), Alias::new("rating"))
            .expr_as(spec_aggregate_expr(), Alias::new("specs"))
            .expr_as(primary_image_expr(), Alias::new("image"))
            .join(
                JoinType::InnerJoin,
                Brand::Table,
                Expr::col((Brand::Table, Brand::Id))
                    .equals((Product::Table, Product::BrandId)),
            )
            .group_by_col((Brand::Table, Brand::Id));

        self.add_sort(&mut query);

        let offset = u64::from(page.saturating_sub(1)) * u64::from(per_page);
        query.limit(u64::from(per_page));
        query.offset(offset);

        query.build_sqlx(PostgresQueryBuilder)
    }

    /// Build a COUNT over distinct product identity.
    ///
    /// Counts the grouped matching-ids subquery rather than raw join rows,
    /// so one-to-many joins and HAVING predicates cannot skew the total.
    pub fn build_count(&self) -> (String, SqlxValues) {
        let mut query = Query::select();
        query
            .expr(Expr::cust("COUNT(*)"))
            .from_subquery(self.matching_ids(None), Alias::new("matching"));

        query.build_sqlx(PostgresQueryBuilder)
    }

    /// Subquery yielding the ids of all products matching the filter,
    /// optionally with one specification name's own selection excluded
    /// (used by the facet aggregator).
    pub fn matching_ids(&self, exclude_spec: Option<&str>) -> SelectStatement {
        let mut query = self.filtered_select(exclude_spec);
        query.column((Product::Table, Product::Id));
        query
    }

    /// The category predicate alone: `None` when the request carried no
    /// category selection, the membership test otherwise. An emptied
    /// selection yields a predicate that matches nothing — restricting is
    /// always safer than silently widening.
    pub fn category_condition(&self) -> Option<SimpleExpr> {
        match &self.filter.category_ids {
            None => None,
            Some(ids) if ids.is_empty() => Some(Expr::cust("FALSE")),
            Some(ids) => {
                Some(Expr::col((Product::Table, Product::CategoryId)).is_in(ids.clone()))
            }
        }
    }

    /// Build the price floor/ceiling query over the status + category
    /// scope only (price itself deliberately not applied, or the range
    /// would collapse to whatever is already selected).
    pub fn build_price_bounds(&self) -> (String, SqlxValues) {
        let mut query = Query::select();
        query
            .expr_as(
                Expr::cust("MIN(product.price)::float8"),
                Alias::new("price_min"),
            )
            .expr_as(
                Expr::cust("MAX(product.price)::float8"),
                Alias::new("price_max"),
            )
            .from(Product::Table)
            .join(
                JoinType::InnerJoin,
                Category::Table,
                Expr::col((Category::Table, Category::Id))
                    .equals((Product::Table, Product::CategoryId)),
            )
            .and_where(Expr::col((Category::Table, Category::Status)).eq(true));

        if let Some(condition) = self.category_condition() {
            query.and_where(condition);
        }

        query.build_sqlx(PostgresQueryBuilder)
    }

    /// Base filtered select: product joined to its active category and
    /// reviews, WHERE predicates applied, grouped by product identity,
    /// rating bounds in HAVING. Callers add their own select list.
    fn filtered_select(&self, exclude_spec: Option<&str>) -> SelectStatement {
        let mut query = Query::select();

        query
            .from(Product::Table)
            .join(
                JoinType::InnerJoin,
                Category::Table,
                Expr::col((Category::Table, Category::Id))
                    .equals((Product::Table, Product::CategoryId)),
            )
            .join(
                JoinType::LeftJoin,
                Review::Table,
                Expr::col((Review::Table, Review::ProductId))
                    .equals((Product::Table, Product::Id)),
            )
            .cond_where(self.where_conditions(exclude_spec))
            .group_by_col((Product::Table, Product::Id))
            .group_by_col((Category::Table, Category::Id));

        if let Some(condition) = self.rating_having() {
            query.and_having(condition);
        }

        query
    }

    /// All WHERE predicates, AND-combined. With no active filters this
    /// degenerates to the active-category scope alone.
    fn where_conditions(&self, exclude_spec: Option<&str>) -> Cond {
        let request = &self.filter.request;
        let mut cond =
            Cond::all().add(Expr::col((Category::Table, Category::Status)).eq(true));

        if let Some(ref name) = request.name
            && !name.is_empty()
        {
            cond = cond.add(Expr::cust_with_values(
                "LOWER(product.name) LIKE LOWER($1)",
                [format!("%{}%", escape_like_wildcards(name))],
            ));
        }

        if let Some(min) = request.price_min {
            cond = cond.add(Expr::col((Product::Table, Product::Price)).gte(min));
        }
        if let Some(max) = request.price_max {
            cond = cond.add(Expr::col((Product::Table, Product::Price)).lte(max));
        }

        if let Some(min) = request.discount_min {
            cond = cond.add(Expr::col((Product::Table, Product::Discount)).gte(min));
        }
        if let Some(max) = request.discount_max {
            cond = cond.add(Expr::col((Product::Table, Product::Discount)).lte(max));
        }

        if let Some(min) = request.quantity_min {
            cond = cond.add(Expr::col((Product::Table, Product::Quantity)).gte(min));
        }

        match request.brands.as_slice() {
            [] => {}
            [brand_id] => {
                cond = cond.add(Expr::col((Product::Table, Product::BrandId)).eq(*brand_id));
            }
            brand_ids => {
                cond = cond
                    .add(Expr::col((Product::Table, Product::BrandId)).is_in(brand_ids.to_vec()));
            }
        }

        if let Some(condition) = self.category_condition() {
            cond = cond.add(condition);
        }

        for (spec_name, values) in &request.specifications {
            if exclude_spec == Some(spec_name.as_str()) {
                continue;
            }
            if let Some(condition) = spec_exists_condition(spec_name, values) {
                cond = cond.add(condition);
            }
        }

        cond
    }

    /// Rating bounds apply to the grouped mean, never the raw review rows.
    fn rating_having(&self) -> Option<SimpleExpr> {
        let request = &self.filter.request;
        let mut cond = Cond::all();
        let mut any = false;

        if let Some(min) = request.rating_min {
            cond = cond.add(avg_rating_expr().gte(min));
            any = true;
        }
        if let Some(max) = request.rating_max {
            cond = cond.add(avg_rating_expr().lte(max));
            any = true;
        }

        any.then(|| cond.into())
    }

    /// Map the sort key to its ORDER BY expression. Every sort carries
    /// `product.id` as an explicit secondary key so pagination is stable
    /// across pages regardless of the store's default row order.
    fn add_sort(&self, query: &mut SelectStatement) {
        match self.filter.request.sort {
            SortKey::Newest => {
                query.order_by((Product::Table, Product::Created), Order::Desc);
            }
            SortKey::PriceAsc => {
                query.order_by((Product::Table, Product::Price), Order::Asc);
            }
            SortKey::PriceDesc => {
                query.order_by((Product::Table, Product::Price), Order::Desc);
            }
            SortKey::NameAsc => {
                query.order_by_expr(Expr::cust("LOWER(product.name)"), Order::Asc);
            }
            SortKey::NameDesc => {
                query.order_by_expr(Expr::cust("LOWER(product.name)"), Order::Desc);
            }
            SortKey::Popularity => {
                query.order_by_expr(
                    Expr::cust("COALESCE(AVG(review.rating)::float8, 0)"),
                    Order::Desc,
                );
            }
        }
        query.order_by((Product::Table, Product::Id), Order::Desc);
    }
}

/// Grouped mean review rating, cast for float comparison and decoding.
fn avg_rating_expr() -> SimpleExpr {
    Expr::cust("AVG(review.rating)::float8")
}

/// Delimiter-encoded specification aggregate: `id:name:value:category_id`
/// entries joined by `|`. Decoded by the row mapper's adapter.
fn spec_aggregate_expr() -> SimpleExpr {
    Expr::cust(
        "(SELECT string_agg(s.id::text || ':' || s.name || ':' || s.value || ':' || s.category_id::text, '|') \
         FROM product_specification ps \
         INNER JOIN specification s ON s.id = ps.specification_id \
         WHERE ps.product_id = product.id)",
    )
}

/// Primary image reference (lowest position wins).
fn primary_image_expr() -> SimpleExpr {
    Expr::cust(
        "(SELECT pi.uri FROM product_image pi \
         WHERE pi.product_id = product.id \
         ORDER BY pi.position, pi.id LIMIT 1)",
    )
}

/// Existence sub-predicate for one specification facet: a matching
/// specification row must exist for the product, name and value compared
/// case-insensitively, accepted values OR'd via IN.
fn spec_exists_condition(
    spec_name: &str,
    values: &std::collections::BTreeSet<String>,
) -> Option<SimpleExpr> {
    if values.is_empty() {
        return None;
    }
    if spec_name.len() > MAX_SPEC_NAME_LEN {
        tracing::warn!(
            spec = %spec_name.chars().take(32).collect::<String>(),
            len = spec_name.len(),
            "specification filter name exceeds maximum length; dropping"
        );
        return None;
    }

    let placeholders: Vec<String> = (2..2 + values.len())
        .map(|n| format!("LOWER(${n})"))
        .collect();
    let sql = format!(
        "EXISTS (SELECT 1 FROM product_specification ps \
         INNER JOIN specification s ON s.id = ps.specification_id \
         WHERE ps.product_id = product.id \
         AND LOWER(s.name) = LOWER($1) \
         AND LOWER(s.value) IN ({}))",
        placeholders.join(", ")
    );

    let mut params: Vec<Value> = Vec::with_capacity(values.len() + 1);
    params.push(spec_name.into());
    for value in values {
        params.push(value.as_str().into());
    }

    Some(Expr::cust_with_values(sql, params))
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::types::FilterRequest;
    use std::collections::{BTreeMap, BTreeSet};

    fn specs(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        entries
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect()
    }

    fn param_count(values: &SqlxValues) -> usize {
        values.0.0.len()
    }

    #[test]
    fn unfiltered_listing_degenerates_to_scope() {
        let resolved = ResolvedFilter::unscoped(FilterRequest::default());
        let builder = CatalogQueryBuilder::new(&resolved);
        let (sql, _) = builder.build_page(1, 10);

        assert!(sql.contains("FROM \"product\""));
        assert!(sql.contains("\"category\".\"status\""));
        assert!(!sql.contains("LIKE"), "no name predicate expected: {sql}");
        assert!(!sql.contains("EXISTS"), "no spec predicate expected: {sql}");
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn name_filter_is_case_insensitive_and_escaped() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            name: Some("100%_clean".to_string()),
            ..Default::default()
        });
        let builder = CatalogQueryBuilder::new(&resolved);
        let (sql, values) = builder.build_page(1, 10);

        assert!(sql.contains("LOWER(product.name) LIKE LOWER("));
        let bound: Vec<String> = values
            .0
            .0
            .iter()
            .filter_map(|v| match v {
                Value::String(Some(s)) => Some(s.as_ref().clone()),
                _ => None,
            })
            .collect();
        assert!(
            bound.iter().any(|s| s == "%100\\%\\_clean%"),
            "wildcards should be escaped in the bound value: {bound:?}"
        );
    }

    #[test]
    fn min_only_and_max_only_bounds_are_both_legal() {
        let min_only = ResolvedFilter::unscoped(FilterRequest {
            price_min: Some(100.0),
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&min_only).build_page(1, 10);
        assert!(sql.contains("\"product\".\"price\" >="));
        assert!(!sql.contains("\"product\".\"price\" <="));

        let max_only = ResolvedFilter::unscoped(FilterRequest {
            price_max: Some(500.0),
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&max_only).build_page(1, 10);
        assert!(sql.contains("\"product\".\"price\" <="));
        assert!(!sql.contains("\"product\".\"price\" >="));
    }

    #[test]
    fn single_brand_uses_equality_multiple_use_in() {
        let single = ResolvedFilter::unscoped(FilterRequest {
            brands: vec![7],
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&single).build_page(1, 10);
        assert!(sql.contains("\"product\".\"brand_id\" ="));
        assert!(!sql.contains("\"product\".\"brand_id\" IN"));

        let multiple = ResolvedFilter::unscoped(FilterRequest {
            brands: vec![7, 9],
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&multiple).build_page(1, 10);
        assert!(sql.contains("\"product\".\"brand_id\" IN"));
    }

    #[test]
    fn emptied_category_selection_matches_nothing() {
        let resolved = ResolvedFilter::scoped(FilterRequest::default(), vec![]);
        let builder = CatalogQueryBuilder::new(&resolved);
        let (sql, _) = builder.build_page(1, 10);

        assert!(
            sql.contains("FALSE"),
            "emptied selection must restrict, not widen: {sql}"
        );
    }

    #[test]
    fn resolved_categories_use_membership() {
        let resolved = ResolvedFilter::scoped(FilterRequest::default(), vec![3, 4, 9]);
        let builder = CatalogQueryBuilder::new(&resolved);
        let (sql, _) = builder.build_page(1, 10);

        assert!(sql.contains("\"product\".\"category_id\" IN"));
        assert!(!sql.contains("FALSE"));
    }

    #[test]
    fn spec_filters_exist_per_name_with_values_bound() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            specifications: specs(&[("Color", &["Black", "Red"]), ("Storage", &["256GB"])]),
            ..Default::default()
        });
        let builder = CatalogQueryBuilder::new(&resolved);
        let (sql, values) = builder.build_page(1, 10);

        assert_eq!(
            sql.matches("EXISTS").count(),
            2,
            "one EXISTS per spec name: {sql}"
        );
        assert!(sql.contains("LOWER(s.name) = LOWER("));
        assert!(sql.contains("LOWER(s.value) IN ("));
        // 2 names + 3 values + limit/offset params at minimum
        assert!(param_count(&values) >= 5);
        // No raw filter value interpolated into the statement text
        assert!(!sql.contains("Black"));
        assert!(!sql.contains("256GB"));
    }

    #[test]
    fn empty_spec_value_set_contributes_nothing() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            specifications: specs(&[("Color", &[])]),
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&resolved).build_page(1, 10);
        assert!(!sql.contains("EXISTS"));
    }

    #[test]
    fn oversized_spec_name_is_dropped() {
        let long_name = "x".repeat(300);
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            specifications: specs(&[(long_name.as_str(), &["v"])]),
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&resolved).build_page(1, 10);
        assert!(!sql.contains("EXISTS"));
    }

    #[test]
    fn rating_bounds_go_to_having() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            rating_min: Some(3.5),
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&resolved).build_page(1, 10);

        assert!(sql.contains("HAVING"));
        // Custom expressions render parenthesized.
        assert!(sql.contains("(AVG(review.rating)::float8) >="), "{sql}");
    }

    #[test]
    fn count_wraps_grouped_matching_ids() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            rating_min: Some(4.0),
            brands: vec![2],
            ..Default::default()
        });
        let (sql, _) = CatalogQueryBuilder::new(&resolved).build_count();

        assert!(sql.contains("COUNT(*)"));
        assert!(sql.contains("\"matching\""));
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("HAVING"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn pagination_offset() {
        let resolved = ResolvedFilter::unscoped(FilterRequest::default());
        let builder = CatalogQueryBuilder::new(&resolved);

        let (_, values_p1) = builder.build_page(1, 10);
        let (_, values_p3) = builder.build_page(3, 10);
        let rendered_p1 = format!("{:?}", values_p1.0);
        let rendered_p3 = format!("{:?}", values_p3.0);
        assert!(rendered_p1.contains("0"), "page 1 offset 0: {rendered_p1}");
        assert!(rendered_p3.contains("20"), "page 3 offset 20: {rendered_p3}");
    }

    #[test]
    fn every_sort_carries_id_tie_break() {
        for sort in [
            SortKey::Newest,
            SortKey::PriceAsc,
            SortKey::PriceDesc,
            SortKey::NameAsc,
            SortKey::NameDesc,
            SortKey::Popularity,
        ] {
            let resolved = ResolvedFilter::unscoped(FilterRequest {
                sort,
                ..Default::default()
            });
            let (sql, _) = CatalogQueryBuilder::new(&resolved).build_page(1, 10);
            assert!(
                sql.contains("\"product\".\"id\" DESC"),
                "{sort:?} must tie-break on id: {sql}"
            );
        }
    }

    #[test]
    fn sort_key_order_by_expressions() {
        let cases = [
            (SortKey::Newest, "\"product\".\"created\" DESC"),
            (SortKey::PriceAsc, "\"product\".\"price\" ASC"),
            (SortKey::PriceDesc, "\"product\".\"price\" DESC"),
            (SortKey::NameAsc, "LOWER(product.name) ASC"),
            (SortKey::NameDesc, "LOWER(product.name) DESC"),
            (
                SortKey::Popularity,
                "COALESCE(AVG(review.rating)::float8, 0) DESC",
            ),
        ];
        for (sort, fragment) in cases {
            let resolved = ResolvedFilter::unscoped(FilterRequest {
                sort,
                ..Default::default()
            });
            let (sql, _) = CatalogQueryBuilder::new(&resolved).build_page(1, 10);
            assert!(sql.contains(fragment), "{sort:?}: expected {fragment} in {sql}");
        }
    }

    #[test]
    fn price_bounds_query_ignores_price_filter() {
        let resolved = ResolvedFilter::scoped(
            FilterRequest {
                price_min: Some(100.0),
                price_max: Some(500.0),
                brands: vec![1],
                ..Default::default()
            },
            vec![4, 5],
        );
        let (sql, _) = CatalogQueryBuilder::new(&resolved).build_price_bounds();

        assert!(sql.contains("MIN(product.price)::float8"));
        assert!(sql.contains("MAX(product.price)::float8"));
        assert!(sql.contains("\"product\".\"category_id\" IN"));
        assert!(sql.contains("\"category\".\"status\""));
        assert!(
            !sql.contains("\"product\".\"price\" >="),
            "price filter must not collapse the observed range: {sql}"
        );
        assert!(!sql.contains("brand_id"), "brand filter not in scope: {sql}");
    }

    #[test]
    fn matching_ids_exclusion_drops_only_that_spec() {
        let resolved = ResolvedFilter::unscoped(FilterRequest {
            specifications: specs(&[("Color", &["Black"]), ("Storage", &["256GB"])]),
            ..Default::default()
        });
        let builder = CatalogQueryBuilder::new(&resolved);

        let with_all = builder.matching_ids(None).to_string(PostgresQueryBuilder);
        let without_color = builder
            .matching_ids(Some("Color"))
            .to_string(PostgresQueryBuilder);

        assert_eq!(with_all.matches("EXISTS").count(), 2);
        assert_eq!(without_color.matches("EXISTS").count(), 1);
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
