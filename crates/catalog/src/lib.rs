//! Faceted product catalog query engine.
//!
//! Turns a flat filter request (name substring, numeric ranges, brands,
//! hierarchical categories, dynamic specification selections) into bounded,
//! parameterized PostgreSQL queries, and returns a paginated listing page
//! with the facet values available for the current filter context.
//!
//! ```no_run
//! use vetrina_catalog::catalog::{CatalogService, FilterRequest};
//! use vetrina_catalog::config::Config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pool = vetrina_catalog::db::create_pool(&config).await?;
//! let service = CatalogService::new(pool, config);
//!
//! let page = service.list_products(FilterRequest::default()).await;
//! println!("{} products, {} pages", page.total_items, page.total_pages);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;

pub use catalog::{CatalogService, FilterRequest, ProductPage};
pub use config::Config;
pub use error::{CatalogError, CatalogResult};
