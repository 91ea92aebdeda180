//! Engine error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by catalog store interactions.
///
/// Invalid ranges and unresolvable category references are deliberately not
/// errors: they are valid (if unsatisfiable) filter states and produce a
/// deterministic empty result instead.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias using CatalogError.
pub type CatalogResult<T> = Result<T, CatalogError>;
