use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::CacheError;

/// Named persistent key/value store with whole-cache deletion.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up `key` in the named cache. `Ok(None)` means not present.
    async fn read(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write `key` into the named cache, creating the cache if needed and
    /// overwriting any existing entry.
    async fn write(&self, cache: &str, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Remove one entry. Returns whether it existed.
    async fn remove(&self, cache: &str, key: &str) -> Result<bool, CacheError>;

    /// Names of all caches currently present.
    async fn cache_names(&self) -> Result<Vec<String>, CacheError>;

    /// Drop an entire cache with all its entries. Returns whether it
    /// existed.
    async fn remove_cache(&self, cache: &str) -> Result<bool, CacheError>;
}

/// Filesystem implementation: one directory per cache, one file per key.
pub struct FsCacheBackend {
    root: PathBuf,
}

impl FsCacheBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn cache_dir(&self, cache: &str) -> PathBuf {
        self.root.join(cache)
    }

    fn entry_path(&self, cache: &str, key: &str) -> PathBuf {
        // Keys may contain path separators or other characters unsafe in
        // file names.
        self.cache_dir(cache)
            .join(urlencoding::encode(key).into_owned())
    }
}

#[async_trait]
impl CacheBackend for FsCacheBackend {
    async fn read(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(cache, key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(CacheError::new)
    }

    async fn write(&self, cache: &str, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let dir = self.cache_dir(cache);
        fs::create_dir_all(&dir).map_err(CacheError::new)?;
        fs::write(self.entry_path(cache, key), value).map_err(CacheError::new)
    }

    async fn remove(&self, cache: &str, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(cache, key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(CacheError::new)?;
        Ok(true)
    }

    async fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(CacheError::new)? {
            let entry = entry.map_err(CacheError::new)?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn remove_cache(&self, cache: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(cache);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(CacheError::new)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> (tempfile::TempDir, FsCacheBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsCacheBackend::new(dir.path().to_path_buf());
        (dir, backend)
    }

    #[tokio::test]
    async fn write_read_remove_round_trip() {
        let (_dir, backend) = test_backend();

        assert_eq!(backend.read("c1", "key").await.unwrap(), None);

        backend.write("c1", "key", b"value").await.unwrap();
        assert_eq!(
            backend.read("c1", "key").await.unwrap(),
            Some(b"value".to_vec())
        );

        assert!(backend.remove("c1", "key").await.unwrap());
        assert!(!backend.remove("c1", "key").await.unwrap());
        assert_eq!(backend.read("c1", "key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_with_path_separators_are_safe() {
        let (_dir, backend) = test_backend();

        backend
            .write("c1", "owner/model:v1", b"data")
            .await
            .unwrap();
        assert_eq!(
            backend.read("c1", "owner/model:v1").await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn cache_names_and_whole_cache_removal() {
        let (_dir, backend) = test_backend();

        backend.write("records", "a", b"1").await.unwrap();
        backend.write("llama-blobs", "b", b"2").await.unwrap();

        let names = backend.cache_names().await.unwrap();
        assert_eq!(names, vec!["llama-blobs", "records"]);

        assert!(backend.remove_cache("llama-blobs").await.unwrap());
        assert!(!backend.remove_cache("llama-blobs").await.unwrap());
        assert_eq!(backend.cache_names().await.unwrap(), vec!["records"]);
    }
}
