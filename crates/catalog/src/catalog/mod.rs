//! Faceted catalog query engine.
//!
//! Pipeline, per request:
//!
//! 1. normalize page geometry ([`service`])
//! 2. resolve category selections to descendant-id closures ([`resolver`])
//! 3. build the predicate tree and bounded SQL ([`builder`])
//! 4. run the listing query, count, and facet aggregation ([`executor`],
//!    [`facets`])
//! 5. serve repeats from the TTL result cache ([`cache`])
//!
//! [`CatalogService`] is the only entry point intended for callers; the
//! submodules are exposed for integration tests and write-side hooks.

pub mod builder;
pub mod cache;
pub mod executor;
pub mod facets;
pub mod resolver;
pub mod service;
pub mod types;

pub use cache::{CacheEntry, FilterSignature, ResultCache};
pub use resolver::CategoryResolver;
pub use service::CatalogService;
pub use types::{
    CategoryRef, FacetEntry, FacetSet, FilterRequest, ProductListing, ProductPage, ResolvedFilter,
    SortKey, SpecValue,
};
