//! Category hierarchy resolution with caching.
//!
//! Expands a set of selected category references (ids or names) into the
//! full closure of descendant category ids, restricted to active
//! categories. Resolved selections are memoized in a DashMap until a
//! write-side invalidation hook clears them.

use super::types::CategoryRef;
use crate::error::{CatalogError, CatalogResult};
use dashmap::DashMap;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Closure over the parent-edge relation, seeded by id or lowercased name.
///
/// `UNION` (not `UNION ALL`) deduplicates on every step, so an accidental
/// cycle in the data cannot loop the recursion.
const DESCENDANTS_SQL: &str = r#"
WITH RECURSIVE descendants AS (
    SELECT c.id FROM category c
    WHERE c.status = TRUE AND (c.id = ANY($1) OR LOWER(c.name) = ANY($2))
    UNION
    SELECT c.id FROM category c
    INNER JOIN descendants d ON c.parent_id = d.id
    WHERE c.status = TRUE
)
SELECT id FROM descendants
"#;

/// Service resolving category selections to descendant-id closures.
pub struct CategoryResolver {
    pool: PgPool,
    /// Bound on the closure query; resolution never blocks past this.
    query_timeout: Duration,
    /// Cache: canonical selection -> resolved closure.
    closure_cache: DashMap<String, Arc<Vec<i64>>>,
}

impl CategoryResolver {
    /// Create a new resolver.
    pub fn new(pool: PgPool, query_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pool,
            query_timeout,
            closure_cache: DashMap::new(),
        })
    }

    /// Resolve selected categories to the inclusive set of descendant ids.
    ///
    /// Unknown ids or names contribute nothing; a non-empty selection can
    /// therefore legally resolve to an empty set, which downstream treats
    /// as "matches nothing". Callers must not invoke this for an empty
    /// selection — omit the category predicate instead.
    pub async fn resolve(&self, selected: &[CategoryRef]) -> CatalogResult<Vec<i64>> {
        let cache_key = canonical_selection(selected);

        if let Some(ids) = self.closure_cache.get(&cache_key) {
            tracing::debug!(selection = %cache_key, "category closure cache hit");
            return Ok(ids.as_ref().clone());
        }

        let mut ids: Vec<i64> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        for reference in selected {
            match reference {
                CategoryRef::Id(id) => ids.push(*id),
                CategoryRef::Name(name) => names.push(name.to_lowercase()),
            }
        }

        let mut resolved: Vec<i64> = bounded_query(
            self.query_timeout,
            sqlx::query_scalar(DESCENDANTS_SQL)
                .bind(&ids)
                .bind(&names)
                .fetch_all(&self.pool),
        )
        .await?;

        resolved.sort_unstable();
        resolved.dedup();

        self.closure_cache
            .insert(cache_key, Arc::new(resolved.clone()));

        Ok(resolved)
    }

    /// Drop all memoized closures. Called from the write-side invalidation
    /// hook whenever a category is created, updated, or deleted.
    pub fn clear_cache(&self) {
        self.closure_cache.clear();
    }

    /// Number of memoized selections (for monitoring).
    pub fn cached_selections(&self) -> usize {
        self.closure_cache.len()
    }
}

/// Run a store query under a hard time bound.
async fn bounded_query<T>(
    limit: Duration,
    query: impl Future<Output = Result<T, sqlx::Error>>,
) -> CatalogResult<T> {
    match tokio::time::timeout(limit, query).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CatalogError::Timeout(limit)),
    }
}

/// Canonical, order-independent key for a category selection.
///
/// Ids and names sort separately so `[Name("tv"), Id(3)]` and
/// `[Id(3), Name("TV")]` collapse to the same key.
fn canonical_selection(selected: &[CategoryRef]) -> String {
    let mut ids: Vec<i64> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for reference in selected {
        match reference {
            CategoryRef::Id(id) => ids.push(*id),
            CategoryRef::Name(name) => names.push(name.to_lowercase()),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    names.sort();
    names.dedup();

    let id_part: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("i:{};n:{}", id_part.join(","), names.join(","))
}
