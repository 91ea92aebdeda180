//! Listing orchestration: the engine boundary.
//!
//! One entry point, [`CatalogService::list_products`], runs the whole
//! pipeline: normalize page geometry, resolve the category selection, check
//! the result cache, then execute the primary listing query with the count
//! and facet aggregation as concurrent secondaries. The boundary is
//! infallible — a failed primary query produces a page carrying an error
//! message, and failed secondaries degrade to zero/empty.

use super::builder::CatalogQueryBuilder;
use super::cache::{CacheEntry, FilterSignature, ResultCache};
use super::executor;
use super::facets::FacetAggregator;
use super::resolver::CategoryResolver;
use super::types::{FacetSet, FilterRequest, ProductPage, ResolvedFilter};
use crate::config::Config;
use crate::error::CatalogError;
use sqlx::PgPool;
use std::sync::Arc;

/// Shown to callers when the primary listing query fails. Deliberately
/// generic; the store error is logged, not leaked.
const LISTING_UNAVAILABLE: &str = "Product listing is temporarily unavailable";

/// Faceted catalog query service.
///
/// Cheap to share behind an `Arc`; all state is the pool, the category
/// resolver, and the result cache, each safe for concurrent use.
pub struct CatalogService {
    pool: PgPool,
    resolver: Arc<CategoryResolver>,
    cache: ResultCache,
    config: Config,
}

impl CatalogService {
    /// Create a service over a connection pool.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let resolver = CategoryResolver::new(pool.clone(), config.secondary_timeout);
        let cache = ResultCache::new(config.cache_capacity);

        Self {
            pool,
            resolver,
            cache,
            config,
        }
    }

    /// Execute a faceted listing request.
    ///
    /// Never returns an error: store failures on the primary query surface
    /// as an error page, secondary failures degrade. Identical concurrent
    /// requests may each run the query once; both writes to the cache store
    /// equivalent values.
    pub async fn list_products(&self, request: FilterRequest) -> ProductPage {
        let (page, per_page) = normalize_page_geometry(&self.config, &request);

        let resolved = match self.resolve_categories(request).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(error = %e, "category resolution failed");
                return ProductPage::error(page, per_page, LISTING_UNAVAILABLE);
            }
        };

        let signature = FilterSignature::of(&resolved, page, per_page);

        if self.config.cache_enabled {
            if let Some(cached) = self.cache.get(&signature).await {
                return ProductPage::new(
                    cached.items.clone(),
                    cached.total,
                    page,
                    per_page,
                    cached.facets.clone(),
                );
            }
        }

        let builder = CatalogQueryBuilder::new(&resolved);
        let aggregator = FacetAggregator::new(&self.pool, &resolved);

        let (items, count, facets) = tokio::join!(
            executor::fetch_page(
                &self.pool,
                &builder,
                page,
                per_page,
                self.config.statement_timeout,
            ),
            tokio::time::timeout(
                self.config.secondary_timeout,
                executor::fetch_count(&self.pool, &builder),
            ),
            tokio::time::timeout(self.config.secondary_timeout, aggregator.aggregate()),
        );

        let items = match items {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "primary listing query failed");
                return ProductPage::error(page, per_page, LISTING_UNAVAILABLE);
            }
        };

        let mut degraded = false;

        let total = match count {
            Ok(Ok(total)) => total,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "count query failed; degrading to zero");
                degraded = true;
                0
            }
            Err(_) => {
                let e = CatalogError::Timeout(self.config.secondary_timeout);
                tracing::warn!(error = %e, "count query timed out; degrading to zero");
                degraded = true;
                0
            }
        };

        let facets = match facets {
            Ok(facets) => facets,
            Err(_) => {
                let e = CatalogError::Timeout(self.config.secondary_timeout);
                tracing::warn!(error = %e, "facet aggregation timed out; degrading to empty");
                degraded = true;
                FacetSet::default()
            }
        };

        if let Some(ttl) = result_cache_ttl(&self.config, degraded) {
            self.cache
                .put(
                    &signature,
                    CacheEntry {
                        items: items.clone(),
                        facets: facets.clone(),
                        total,
                        ttl,
                    },
                    ttl,
                )
                .await;
        }

        ProductPage::new(items, total, page, per_page, facets)
    }

    async fn resolve_categories(
        &self,
        request: FilterRequest,
    ) -> crate::error::CatalogResult<ResolvedFilter> {
        if request.categories.is_empty() {
            return Ok(ResolvedFilter::unscoped(request));
        }

        let ids = self.resolver.resolve(&request.categories).await?;
        Ok(ResolvedFilter::scoped(request, ids))
    }

    /// Write-side hook for product, brand, specification, or review
    /// mutations: cached listings may now be stale.
    pub fn invalidate_results(&self) {
        self.cache.invalidate_all();
        tracing::debug!("catalog result cache invalidated");
    }

    /// Write-side hook for category mutations: both the memoized hierarchy
    /// closures and every cached listing are stale.
    pub fn invalidate_categories(&self) {
        self.resolver.clear_cache();
        self.cache.invalidate_all();
        tracing::debug!("category closures and result cache invalidated");
    }

    /// Live cache entry count (for monitoring).
    pub fn cached_results(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// TTL to cache a computed result under, `None` when it must not be cached.
///
/// A result whose count or facets were lost to a secondary failure stays
/// out of the cache: a transient store hiccup must not pin a zero total or
/// an empty facet set for the full TTL while the data is fine.
fn result_cache_ttl(config: &Config, degraded: bool) -> Option<std::time::Duration> {
    (config.cache_enabled && !degraded).then_some(config.cache_ttl)
}

/// Clamp the requested page geometry to legal values.
///
/// Page numbers below 1 clamp to 1. A zero `per_page` takes the configured
/// default; an oversized one is capped with a warning rather than rejected.
fn normalize_page_geometry(config: &Config, request: &FilterRequest) -> (u32, u32) {
    let page = request.page.max(1);

    let per_page = if request.per_page == 0 {
        config.default_page_size
    } else if request.per_page > config.max_page_size {
        tracing::warn!(
            requested = request.per_page,
            max = config.max_page_size,
            "per_page over maximum, capping"
        );
        config.max_page_size
    } else {
        request.per_page
    };

    (page, per_page)
}
