//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// How long a request may wait for a pooled connection (default: 5s).
    pub database_acquire_timeout: Duration,

    /// Page size used when a request asks for zero (default: 10).
    pub default_page_size: u32,

    /// Hard cap on requested page size (default: 100).
    pub max_page_size: u32,

    /// Statement timeout applied to the primary listing query (default: 10s).
    pub statement_timeout: Duration,

    /// Bound on each secondary query — count and facet aggregation
    /// (default: 5s). A timed-out secondary degrades to zero/empty.
    pub secondary_timeout: Duration,

    /// TTL for cached listing results (default: 10 hours — catalog
    /// composition changes infrequently relative to traffic).
    pub cache_ttl: Duration,

    /// Maximum cached filter signatures (default: 10,000).
    pub cache_capacity: u64,

    /// Whether the result cache participates at all. When disabled every
    /// lookup is a miss; correctness is unaffected.
    pub cache_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let acquire_timeout_secs: u64 = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("DATABASE_ACQUIRE_TIMEOUT_SECS must be a valid u64")?;

        let default_page_size = env::var("CATALOG_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("CATALOG_DEFAULT_PAGE_SIZE must be a valid u32")?;

        let max_page_size = env::var("CATALOG_MAX_PAGE_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("CATALOG_MAX_PAGE_SIZE must be a valid u32")?;

        let statement_timeout_secs: u64 = env::var("CATALOG_STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("CATALOG_STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let secondary_timeout_secs: u64 = env::var("CATALOG_SECONDARY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("CATALOG_SECONDARY_TIMEOUT_SECS must be a valid u64")?;

        let cache_ttl_secs: u64 = env::var("CATALOG_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "36000".to_string())
            .parse()
            .context("CATALOG_CACHE_TTL_SECS must be a valid u64")?;

        let cache_capacity = env::var("CATALOG_CACHE_CAPACITY")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("CATALOG_CACHE_CAPACITY must be a valid u64")?;

        let cache_enabled = env::var("CATALOG_CACHE_ENABLED")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            default_page_size,
            max_page_size,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
            secondary_timeout: Duration::from_secs(secondary_timeout_secs),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_capacity,
            cache_enabled,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_secs(5),
            default_page_size: 10,
            max_page_size: 100,
            statement_timeout: Duration::from_secs(10),
            secondary_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(36_000),
            cache_capacity: 10_000,
            cache_enabled: true,
        }
    }
}
