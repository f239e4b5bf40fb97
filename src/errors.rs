use thiserror::Error;

/// Crate-wide error type for store, retrieval and generation paths.
///
/// Cache backend failures never surface through this enum: the cache
/// manager downgrades them to `CacheLookup::Degraded` / boolean results
/// at its own boundary (see `cache::ModelCacheManager`).
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("embedding extraction failed: {0}")]
    Extraction(String),
    #[error("inference engine is not initialized")]
    NotInitialized,
    #[error("embedding backfill failed for document id(s) {failed_ids:?}")]
    PartialFailure { failed_ids: Vec<i64> },
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn extraction<E: std::fmt::Display>(err: E) -> Self {
        RagError::Extraction(err.to_string())
    }
}

/// Error raised by `CacheBackend` implementations.
///
/// Deliberately a distinct type with no `From<CacheError> for RagError`
/// impl, so backend failures cannot leak past the cache manager.
#[derive(Debug, Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(String);

impl CacheError {
    pub fn new<E: std::fmt::Display>(err: E) -> Self {
        CacheError(err.to_string())
    }
}
