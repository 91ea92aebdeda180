//! Catalog query engine types.
//!
//! Provides type definitions for the faceted listing pipeline:
//! - FilterRequest: the flat filter object accepted at the engine boundary
//! - ResolvedFilter: the request after category hierarchy resolution
//! - FacetSet: available facet values computed for the current filter context
//! - ProductListing / ProductPage: the mapped output shape

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reference to a category, by id or by name.
///
/// Name matching is case-insensitive and restricted to active categories;
/// an unknown reference contributes no ids during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    /// Category primary key.
    Id(i64),
    /// Category name.
    Name(String),
}

/// Closed set of listing sort keys.
///
/// Unknown or absent keys fall back to `Newest`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
    /// Highest aggregate rating first.
    Popularity,
    /// Most recently created first (default); `#[serde(other)]` must sit on
    /// the final variant, so unknown keys land here too.
    #[default]
    #[serde(other)]
    Newest,
}

/// Canonical filter input for a catalog listing request.
///
/// Every field is optional; an absent field contributes no predicate.
/// Specification keys are dynamic — any name recorded against a product is
/// a legal facet, so they are carried as an open-ended ordered map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRequest {
    /// Case-insensitive substring match on product name.
    pub name: Option<String>,

    /// Inclusive price bounds; each side is independently optional.
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,

    /// Inclusive discount bounds.
    pub discount_min: Option<f64>,
    pub discount_max: Option<f64>,

    /// Inclusive bounds on the aggregate (mean) review rating.
    pub rating_min: Option<f64>,
    pub rating_max: Option<f64>,

    /// Minimum stock quantity.
    pub quantity_min: Option<i64>,

    /// Brand ids; empty = no brand constraint.
    #[serde(default)]
    pub brands: Vec<i64>,

    /// Category selections; empty = no category constraint.
    #[serde(default)]
    pub categories: Vec<CategoryRef>,

    /// Specification name -> accepted values. Values within one name are
    /// OR'd; distinct names are AND'd. Ordered maps keep signatures
    /// deterministic.
    #[serde(default)]
    pub specifications: BTreeMap<String, BTreeSet<String>>,

    /// Sort key.
    #[serde(default)]
    pub sort: SortKey,

    /// Page number, 1-based.
    #[serde(default = "default_page")]
    pub page: u32,

    /// Items per page; capped by the configured maximum.
    #[serde(default)]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

/// A filter request after category hierarchy resolution.
///
/// `category_ids: None` means the request carried no category selection and
/// the category predicate is omitted entirely. `Some(vec![])` means a
/// selection was made but resolved to nothing — downstream must match
/// nothing, never silently drop the filter.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub request: FilterRequest,
    pub category_ids: Option<Vec<i64>>,
}

impl ResolvedFilter {
    /// Wrap a request that carried no category selection.
    pub fn unscoped(request: FilterRequest) -> Self {
        Self {
            request,
            category_ids: None,
        }
    }

    /// Wrap a request with its resolved category closure.
    pub fn scoped(request: FilterRequest, mut category_ids: Vec<i64>) -> Self {
        category_ids.sort_unstable();
        category_ids.dedup();
        Self {
            request,
            category_ids: Some(category_ids),
        }
    }
}

/// One decoded product specification value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecValue {
    pub id: i64,
    pub name: String,
    pub value: String,
    pub category_id: i64,
}

/// A single product row in a listing page.
///
/// Read-only projection assembled by the row mapper; image references are
/// opaque and passed through to the media collaborator untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductListing {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub price: f64,
    pub discount: f64,
    pub quantity: i64,
    pub description: Option<String>,
    pub category_id: i64,
    pub category_name: String,
    pub brand_id: i64,
    pub brand_name: String,
    /// Mean review rating; `None` when the product has no reviews.
    pub rating: Option<f64>,
    /// Primary image reference.
    pub image: Option<String>,
    /// Decoded specification values.
    pub specs: Vec<SpecValue>,
    /// Unix timestamp when created.
    pub created: i64,
}

/// An available facet value (category or brand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetEntry {
    pub id: i64,
    pub name: String,
}

/// Facet values available for the current filter context.
///
/// Recomputed per request (or served from cache); never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetSet {
    pub categories: Vec<FacetEntry>,
    pub brands: Vec<FacetEntry>,
    /// Specification name -> distinct available values.
    pub specifications: BTreeMap<String, BTreeSet<String>>,
    /// Price floor/ceiling over the category-scoped product set.
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
}

impl FacetSet {
    /// True when no facet data is present at all.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.brands.is_empty()
            && self.specifications.is_empty()
            && self.price_min.is_none()
            && self.price_max.is_none()
    }
}

/// Result of a catalog listing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    /// Mapped product rows for the requested page.
    pub items: Vec<ProductListing>,

    /// Total matching products across all pages.
    pub total_items: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Items per page after capping.
    pub per_page: u32,

    /// Total number of pages.
    pub total_pages: u32,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,

    /// Facet values available for this filter context.
    pub facets: FacetSet,

    /// Populated when the primary listing query failed; items/counts are
    /// then empty rather than a raw error escaping the engine boundary.
    pub error_message: Option<String>,
}

impl ProductPage {
    /// Create a page with paging calculations.
    pub fn new(
        items: Vec<ProductListing>,
        total_items: u64,
        page: u32,
        per_page: u32,
        facets: FacetSet,
    ) -> Self {
        let total_pages = if per_page > 0 {
            total_items.div_ceil(u64::from(per_page)) as u32
        } else {
            1
        };

        Self {
            items,
            total_items,
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
            facets,
            error_message: None,
        }
    }

    /// Create an empty page (unsatisfiable filter, empty catalog).
    pub fn empty(page: u32, per_page: u32) -> Self {
        Self::new(Vec::new(), 0, page, per_page, FacetSet::default())
    }

    /// Create an error page for a failed primary query.
    pub fn error(page: u32, per_page: u32, message: impl Into<String>) -> Self {
        let mut result = Self::empty(page, per_page);
        result.error_message = Some(message.into());
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn filter_request_defaults() {
        let request = FilterRequest::default();
        assert!(request.name.is_none());
        assert!(request.brands.is_empty());
        assert!(request.categories.is_empty());
        assert!(request.specifications.is_empty());
        assert_eq!(request.sort, SortKey::Newest);
    }

    #[test]
    fn filter_request_deserializes_sparse_json() {
        let json = r#"{"price_min": 100.0, "brands": [3], "page": 2, "per_page": 10}"#;
        let request: FilterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.price_min, Some(100.0));
        assert_eq!(request.brands, vec![3]);
        assert_eq!(request.page, 2);
        assert_eq!(request.per_page, 10);
        assert!(request.price_max.is_none());
    }

    #[test]
    fn unknown_sort_key_falls_back_to_newest() {
        let sort: SortKey = serde_json::from_str("\"popularity\"").unwrap();
        assert_eq!(sort, SortKey::Popularity);

        let sort: SortKey = serde_json::from_str("\"bogus_key\"").unwrap();
        assert_eq!(sort, SortKey::Newest);
    }

    #[test]
    fn category_ref_untagged() {
        let refs: Vec<CategoryRef> = serde_json::from_str(r#"[7, "Laptops"]"#).unwrap();
        assert_eq!(refs[0], CategoryRef::Id(7));
        assert_eq!(refs[1], CategoryRef::Name("Laptops".to_string()));
    }

    #[test]
    fn resolved_filter_sorts_and_dedupes_ids() {
        let resolved = ResolvedFilter::scoped(FilterRequest::default(), vec![5, 3, 5, 1]);
        assert_eq!(resolved.category_ids, Some(vec![1, 3, 5]));
    }

    #[test]
    fn product_page_paging() {
        let page = ProductPage::new(vec![], 25, 2, 10, FacetSet::default());
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn product_page_first_and_last() {
        let first = ProductPage::new(vec![], 25, 1, 10, FacetSet::default());
        assert!(!first.has_prev);
        assert!(first.has_next);

        let last = ProductPage::new(vec![], 25, 3, 10, FacetSet::default());
        assert!(last.has_prev);
        assert!(!last.has_next);
    }

    #[test]
    fn product_page_empty() {
        let page = ProductPage::empty(1, 10);
        assert_eq!(page.total_items, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.facets.is_empty());
        assert!(page.error_message.is_none());
    }

    #[test]
    fn product_page_error_carries_message() {
        let page = ProductPage::error(3, 20, "store unavailable");
        assert_eq!(page.error_message.as_deref(), Some("store unavailable"));
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 0);
        assert_eq!(page.page, 3);
    }

    #[test]
    fn facet_set_is_empty() {
        let mut facets = FacetSet::default();
        assert!(facets.is_empty());

        facets.price_min = Some(9.99);
        assert!(!facets.is_empty());
    }
}
