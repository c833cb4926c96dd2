//! This module contains errors pertaining to the analysis cache.
//!
//! Cache errors are never fatal to an analysis request: a failed lookup or
//! store is logged and the computation falls back to running uncached.

use thiserror::Error;

/// Errors that occur when reading from or writing to the analysis cache.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The cache entry for {key} was poisoned by a failed computation")]
    PoisonedEntry { key: String },

    #[error("The cache backing store failed: {message}")]
    BackingStore { message: String },
}

/// The result type for methods that may have cache errors.
pub type Result<T> = std::result::Result<T, Error>;
