//! GGUF weight provisioning.
//!
//! The generation model's weights are fetched from Hugging Face on first
//! use and kept under the models directory. Download progress is reported
//! as human-readable lines on the engine progress log.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::config::{AppPaths, ModelSource};
use crate::engine::ProgressLog;
use crate::errors::RagError;

pub struct WeightsFetcher {
    client: Client,
    models_dir: PathBuf,
}

impl WeightsFetcher {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            client: Client::new(),
            models_dir: paths.models_dir.clone(),
        }
    }

    pub fn local_path(&self, source: &ModelSource) -> PathBuf {
        self.models_dir.join(&source.filename)
    }

    /// Make sure the weight file exists locally, downloading it when
    /// missing. Returns the path to the file.
    pub async fn ensure_local(
        &self,
        source: &ModelSource,
        progress: &ProgressLog,
    ) -> Result<PathBuf, RagError> {
        let target = self.local_path(source);
        if target.exists() {
            progress.append(format!("Weights already present: {}", source.filename));
            return Ok(target);
        }

        if let Some(parent) = target.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let url = hf_resolve_url(&source.repo_id, &source.filename, source.revision.as_deref());
        progress.append(format!(
            "Downloading {} from {}",
            source.filename, source.repo_id
        ));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RagError::internal)?
            .error_for_status()
            .map_err(RagError::internal)?;

        let total = response.content_length().unwrap_or(0);
        let mut stream = response.bytes_stream();

        let mut file = fs::File::create(&target).map_err(RagError::internal)?;
        let mut downloaded: u64 = 0;
        let mut last_percent: u64 = 0;
        let mut hasher = Sha256::new();

        while let Some(chunk) = stream.next().await {
            let data = chunk.map_err(RagError::internal)?;
            file.write_all(&data).map_err(RagError::internal)?;
            hasher.update(&data);
            downloaded += data.len() as u64;

            if total > 0 {
                let percent = downloaded * 100 / total;
                if percent >= last_percent + 10 {
                    last_percent = percent;
                    progress.append(format!("Downloading weights... {}%", percent));
                }
            }
        }

        let actual_sha256 = hex::encode(hasher.finalize());
        if let Some(expected) = normalize_sha256(source.sha256.as_deref()) {
            if actual_sha256 != expected {
                let _ = fs::remove_file(&target);
                return Err(RagError::Internal(format!(
                    "weight file SHA256 mismatch for {} (expected {}, got {})",
                    source.filename, expected, actual_sha256
                )));
            }
        }

        progress.append(format!(
            "Download complete ({} bytes): {}",
            downloaded, source.filename
        ));
        Ok(target)
    }
}

fn hf_resolve_url(repo_id: &str, filename: &str, revision: Option<&str>) -> String {
    let revision = revision
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("main");
    format!(
        "https://huggingface.co/{}/resolve/{}/{}?download=true",
        repo_id,
        urlencoding::encode(revision),
        filename
    )
}

fn normalize_sha256(value: Option<&str>) -> Option<String> {
    let trimmed = value.map(str::trim).filter(|v| !v.is_empty())?;
    if trimmed.len() != 64 {
        return None;
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hf_url_uses_revision_when_provided() {
        let url = hf_resolve_url("owner/model", "file.gguf", Some("abc123"));
        assert!(url.contains("/resolve/abc123/"));
    }

    #[test]
    fn hf_url_defaults_to_main_when_revision_missing() {
        let url = hf_resolve_url("owner/model", "file.gguf", None);
        assert!(url.contains("/resolve/main/"));
        let url = hf_resolve_url("owner/model", "file.gguf", Some("  "));
        assert!(url.contains("/resolve/main/"));
    }

    #[test]
    fn hf_url_encodes_revision_value() {
        let url = hf_resolve_url("owner/model", "file.gguf", Some("feature branch"));
        assert!(url.contains("/resolve/feature%20branch/"));
    }

    #[test]
    fn normalize_sha_rejects_invalid_values() {
        assert!(normalize_sha256(Some("not-a-hash")).is_none());
        assert!(normalize_sha256(Some("")).is_none());
        assert!(normalize_sha256(None).is_none());

        let valid = "A".repeat(64);
        assert_eq!(
            normalize_sha256(Some(&valid)),
            Some("a".repeat(64))
        );
    }

    #[tokio::test]
    async fn ensure_local_short_circuits_on_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::config::AppPaths::under(dir.path());
        let fetcher = WeightsFetcher::new(&paths);

        let source = ModelSource {
            repo_id: "owner/model".to_string(),
            filename: "weights.gguf".to_string(),
            revision: None,
            sha256: None,
        };
        fs::write(fetcher.local_path(&source), b"stub").unwrap();

        let progress = ProgressLog::new();
        let path = fetcher.ensure_local(&source, &progress).await.unwrap();
        assert_eq!(path, fetcher.local_path(&source));
        assert!(progress
            .snapshot()
            .iter()
            .any(|line| line.contains("already present")));
    }
}
