use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::backend::CacheBackend;

/// Name of the cache partition holding model records.
pub const MODEL_RECORD_CACHE: &str = "model-records";

/// Cache partitions created by the inference engine itself carry one of
/// these markers in their name; a full clear sweeps them too so stale
/// engine-internal data cannot survive a manual invalidation.
const ENGINE_CACHE_MARKERS: &[&str] = &["llama", "engine"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCacheRecord {
    pub model_id: String,
    pub cached: bool,
    /// Epoch milliseconds at cache time.
    pub timestamp_ms: i64,
}

impl ModelCacheRecord {
    pub fn describe(&self) -> String {
        match Utc.timestamp_millis_opt(self.timestamp_ms).single() {
            Some(when) => format!(
                "Cached on {} at {} UTC",
                when.format("%Y-%m-%d"),
                when.format("%H:%M:%S")
            ),
            None => "No cache info".to_string(),
        }
    }
}

/// Outcome of a cache lookup.
///
/// `Degraded` means the backend could not answer; callers that only care
/// about the happy path treat it like `Miss`, but the distinction is kept
/// so "definitely not cached" and "cache unavailable" stay separable.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(ModelCacheRecord),
    Miss,
    Degraded(String),
}

/// Tracks which models already have their weights materialized locally.
///
/// Every operation degrades gracefully: backend failures are logged and
/// reported as `Degraded` / `false` / `None`, never raised, so a broken
/// cache can only cost a redundant download, not a failed query.
#[derive(Clone)]
pub struct ModelCacheManager {
    backend: Arc<dyn CacheBackend>,
}

impl ModelCacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub async fn lookup(&self, model_id: &str) -> CacheLookup {
        match self.backend.read(MODEL_RECORD_CACHE, model_id).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<ModelCacheRecord>(&bytes) {
                Ok(record) => CacheLookup::Hit(record),
                Err(err) => {
                    tracing::warn!("corrupt cache record for {}: {}", model_id, err);
                    CacheLookup::Degraded(err.to_string())
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(err) => {
                tracing::warn!("cache lookup failed for {}: {}", model_id, err);
                CacheLookup::Degraded(err.to_string())
            }
        }
    }

    pub async fn is_cached(&self, model_id: &str) -> bool {
        matches!(self.lookup(model_id).await, CacheLookup::Hit(_))
    }

    pub async fn get_info(&self, model_id: &str) -> Option<ModelCacheRecord> {
        match self.lookup(model_id).await {
            CacheLookup::Hit(record) => Some(record),
            CacheLookup::Miss | CacheLookup::Degraded(_) => None,
        }
    }

    /// Record that the model's weights are now materialized. Overwrites
    /// any prior record for the same id. Returns false on backend failure.
    pub async fn cache(&self, model_id: &str) -> bool {
        let record = ModelCacheRecord {
            model_id: model_id.to_string(),
            cached: true,
            timestamp_ms: Utc::now().timestamp_millis(),
        };

        let bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("failed to serialize cache record for {}: {}", model_id, err);
                return false;
            }
        };

        match self.backend.write(MODEL_RECORD_CACHE, model_id, &bytes).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("failed to cache model {}: {}", model_id, err);
                false
            }
        }
    }

    /// Invalidate cache state. With a model id, removes just that record.
    /// Without one, removes every record and additionally drops any cache
    /// partition whose name matches the engine's internal naming
    /// convention. Returns false when any step failed.
    pub async fn clear(&self, model_id: Option<&str>) -> bool {
        if let Some(model_id) = model_id {
            return match self.backend.remove(MODEL_RECORD_CACHE, model_id).await {
                Ok(_) => true,
                Err(err) => {
                    tracing::warn!("failed to clear cache record for {}: {}", model_id, err);
                    false
                }
            };
        }

        let mut ok = true;

        if let Err(err) = self.backend.remove_cache(MODEL_RECORD_CACHE).await {
            tracing::warn!("failed to clear model records: {}", err);
            ok = false;
        }

        let names = match self.backend.cache_names().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!("failed to enumerate caches during clear: {}", err);
                return false;
            }
        };

        for name in names {
            let lowered = name.to_lowercase();
            if ENGINE_CACHE_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker))
            {
                if let Err(err) = self.backend.remove_cache(&name).await {
                    tracing::warn!("failed to drop engine cache {}: {}", name, err);
                    ok = false;
                }
            }
        }

        ok
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cache::FsCacheBackend;
    use crate::errors::CacheError;

    fn test_manager() -> (tempfile::TempDir, ModelCacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FsCacheBackend::new(dir.path().to_path_buf()));
        (dir, ModelCacheManager::new(backend))
    }

    #[tokio::test]
    async fn cache_round_trip() {
        let (_dir, manager) = test_manager();
        let before = Utc::now().timestamp_millis();

        assert!(!manager.is_cached("model-a").await);
        assert!(manager.cache("model-a").await);
        assert!(manager.is_cached("model-a").await);

        let info = manager.get_info("model-a").await.unwrap();
        assert_eq!(info.model_id, "model-a");
        assert!(info.cached);
        assert!(info.timestamp_ms >= before);
        assert!(info.timestamp_ms <= Utc::now().timestamp_millis());

        assert!(manager.clear(Some("model-a")).await);
        assert!(!manager.is_cached("model-a").await);
        assert!(manager.get_info("model-a").await.is_none());
    }

    #[tokio::test]
    async fn recache_overwrites_prior_record() {
        let (_dir, manager) = test_manager();

        assert!(manager.cache("model-a").await);
        let first = manager.get_info("model-a").await.unwrap();

        assert!(manager.cache("model-a").await);
        let second = manager.get_info("model-a").await.unwrap();

        assert_eq!(second.model_id, first.model_id);
        assert!(second.timestamp_ms >= first.timestamp_ms);
    }

    #[tokio::test]
    async fn full_clear_sweeps_engine_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FsCacheBackend::new(dir.path().to_path_buf()));
        let manager = ModelCacheManager::new(backend.clone());

        manager.cache("model-a").await;
        manager.cache("model-b").await;
        backend.write("llama-blobs", "w", b"x").await.unwrap();
        backend.write("engine-scratch", "w", b"x").await.unwrap();
        backend.write("unrelated", "w", b"x").await.unwrap();

        assert!(manager.clear(None).await);

        assert!(!manager.is_cached("model-a").await);
        assert!(!manager.is_cached("model-b").await);
        let names = backend.cache_names().await.unwrap();
        assert_eq!(names, vec!["unrelated"]);
    }

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn read(&self, _cache: &str, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::new("backend offline"))
        }

        async fn write(&self, _cache: &str, _key: &str, _value: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::new("backend offline"))
        }

        async fn remove(&self, _cache: &str, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::new("backend offline"))
        }

        async fn cache_names(&self) -> Result<Vec<String>, CacheError> {
            Err(CacheError::new("backend offline"))
        }

        async fn remove_cache(&self, _cache: &str) -> Result<bool, CacheError> {
            Err(CacheError::new("backend offline"))
        }
    }

    #[tokio::test]
    async fn broken_backend_degrades_instead_of_failing() {
        let manager = ModelCacheManager::new(Arc::new(BrokenBackend));

        match manager.lookup("model-a").await {
            CacheLookup::Degraded(reason) => assert!(reason.contains("backend offline")),
            other => panic!("expected Degraded, got {other:?}"),
        }
        assert!(!manager.is_cached("model-a").await);
        assert!(manager.get_info("model-a").await.is_none());
        assert!(!manager.cache("model-a").await);
        assert!(!manager.clear(Some("model-a")).await);
        assert!(!manager.clear(None).await);
    }

    #[test]
    fn describe_renders_timestamp() {
        let record = ModelCacheRecord {
            model_id: "m".to_string(),
            cached: true,
            timestamp_ms: 1_700_000_000_000,
        };
        let text = record.describe();
        assert!(text.starts_with("Cached on 2023-11-14 at "));
    }
}
