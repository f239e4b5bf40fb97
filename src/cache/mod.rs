//! Model cache tracking.
//!
//! `CacheBackend` is a named, persistent key/value store (open a cache by
//! name, match a key, put, delete, enumerate caches, drop whole caches).
//! `ModelCacheManager` sits on top and tracks whether a model's weights
//! have already been materialized locally, degrading gracefully when the
//! backend misbehaves.

mod backend;
mod manager;

pub use backend::{CacheBackend, FsCacheBackend};
pub use manager::{CacheLookup, ModelCacheManager, ModelCacheRecord, MODEL_RECORD_CACHE};
