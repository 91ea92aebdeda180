//! Result cache keyed by canonical filter signatures.
//!
//! Memoizes `(items, facets, total)` tuples per resolved filter with
//! TTL-based expiry and bounded capacity. The key space is combinatorially
//! large, so entries carry their own TTL and the cache evicts by size.
//! Signatures are computed *after* category resolution, so equivalent
//! selections by name and by id collapse to the same key.
//!
//! The engine is correct with the cache entirely unavailable — a disabled
//! or failing cache is only a performance penalty.

use super::types::{FacetSet, ProductListing, ResolvedFilter, SortKey};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cached result of one listing request.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Vec<ProductListing>,
    pub facets: FacetSet,
    pub total: u64,
    /// Per-entry time to live, honored by the expiry policy.
    pub ttl: Duration,
}

/// Canonical, order-independent cache key for a resolved filter.
///
/// Shape: `{scope}:{sha256-hex}` where scope is the sorted resolved
/// category-id list (`all` when unconstrained), enabling prefix
/// invalidation per category scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSignature(String);

impl FilterSignature {
    /// Compute the signature for a resolved filter with its normalized
    /// page geometry.
    pub fn of(filter: &ResolvedFilter, page: u32, per_page: u32) -> Self {
        let scope = match &filter.category_ids {
            None => "all".to_string(),
            Some(ids) => {
                let parts: Vec<String> = ids.iter().map(ToString::to_string).collect();
                format!("c{}", parts.join("."))
            }
        };

        let digest = Sha256::digest(canonical_string(filter, page, per_page).as_bytes());
        Self(format!("{scope}:{}", hex::encode(digest)))
    }

    /// The full cache key.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// The category-scope prefix (everything before the digest).
    pub fn scope(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(s, _)| s)
    }
}

/// Deterministic serialization of every filter dimension.
///
/// Case-insensitive dimensions (name substring, specification names and
/// values) are lowercased so requests differing only in case collapse.
/// Collections are already ordered: category ids are sorted by resolution,
/// specifications live in BTree maps/sets, and brands are sorted here.
fn canonical_string(filter: &ResolvedFilter, page: u32, per_page: u32) -> String {
    let request = &filter.request;
    let mut out = String::new();

    let _ = write!(
        out,
        "name={};",
        request.name.as_deref().map(str::to_lowercase).unwrap_or_default()
    );
    let _ = write!(
        out,
        "price={:?},{:?};discount={:?},{:?};rating={:?},{:?};qty={:?};",
        request.price_min,
        request.price_max,
        request.discount_min,
        request.discount_max,
        request.rating_min,
        request.rating_max,
        request.quantity_min,
    );

    let mut brands = request.brands.clone();
    brands.sort_unstable();
    brands.dedup();
    let _ = write!(out, "brands={brands:?};");

    let _ = write!(out, "categories={:?};", filter.category_ids);

    out.push_str("specs=");
    for (name, values) in &request.specifications {
        let values: std::collections::BTreeSet<String> =
            values.iter().map(|v| v.to_lowercase()).collect();
        let _ = write!(out, "{}->{values:?},", name.to_lowercase());
    }
    out.push(';');

    let sort = match request.sort {
        SortKey::Newest => "newest",
        SortKey::PriceAsc => "price_asc",
        SortKey::PriceDesc => "price_desc",
        SortKey::NameAsc => "name_asc",
        SortKey::NameDesc => "name_desc",
        SortKey::Popularity => "popularity",
    };
    let _ = write!(out, "sort={sort};page={page};per_page={per_page}");

    out
}

/// Expiry policy reading each entry's own TTL.
struct PerEntryExpiry;

impl moka::Expiry<String, Arc<CacheEntry>> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Keyed result cache with per-entry TTL and prefix invalidation.
///
/// Concurrent reads and idempotent concurrent writes are safe: each key's
/// value is produced independently and replacing an entry with a fresher
/// equivalent is always acceptable.
pub struct ResultCache {
    inner: moka::future::Cache<String, Arc<CacheEntry>>,
}

impl ResultCache {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryExpiry)
            .support_invalidation_closures()
            .build();

        Self { inner }
    }

    /// Look up a cached result.
    pub async fn get(&self, signature: &FilterSignature) -> Option<Arc<CacheEntry>> {
        let entry = self.inner.get(signature.key()).await;
        if entry.is_some() {
            tracing::debug!(key = %signature.key(), "catalog cache hit");
        }
        entry
    }

    /// Store a result under its signature with the given TTL.
    pub async fn put(&self, signature: &FilterSignature, mut entry: CacheEntry, ttl: Duration) {
        entry.ttl = ttl;
        self.inner
            .insert(signature.key().to_string(), Arc::new(entry))
            .await;
        tracing::debug!(key = %signature.key(), ttl = ?ttl, "catalog cache set");
    }

    /// Invalidate a single signature.
    pub async fn invalidate(&self, signature: &FilterSignature) {
        self.inner.invalidate(signature.key()).await;
    }

    /// Invalidate every entry whose key starts with `prefix` (e.g. one
    /// category scope).
    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            tracing::warn!(error = %e, "cache prefix invalidation failed");
        }
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Number of live entries (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
