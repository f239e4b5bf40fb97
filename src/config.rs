use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Filesystem locations used by the crate.
///
/// Everything lives under one data directory so a single profile can be
/// wiped or relocated as a unit.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub models_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::under(&data_dir)
    }

    /// Root all paths under an explicit directory. Tests point this at a
    /// temp dir.
    pub fn under(root: &Path) -> Self {
        let data_dir = root.to_path_buf();
        let log_dir = data_dir.join("logs");
        let db_path = data_dir.join("localrag.db");
        let cache_dir = data_dir.join("cache");
        let models_dir = data_dir.join("models");
        let config_path = data_dir.join("config.yml");

        for dir in [&data_dir, &log_dir, &cache_dir, &models_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
            cache_dir,
            models_dir,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("LOCALRAG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".localrag");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("localrag");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("localrag");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("localrag")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Where the generation model's GGUF weights come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    pub repo_id: String,
    pub filename: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            repo_id: "HuggingFaceTB/SmolLM2-135M-Instruct-GGUF".to_string(),
            filename: "smollm2-135m-instruct-q8_0.gguf".to_string(),
            revision: None,
            sha256: None,
        }
    }
}

/// Runtime settings for the spawned llama-server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_engine_port")]
    pub port: u16,
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,
    #[serde(default = "default_n_gpu_layers")]
    pub n_gpu_layers: i32,
    /// Explicit path to the llama-server binary. Discovered on PATH when
    /// unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            port: default_engine_port(),
            n_ctx: default_n_ctx(),
            n_gpu_layers: default_n_gpu_layers(),
            binary: None,
        }
    }
}

/// Settings for the embedding backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_url")]
    pub url: String,
    /// Identifier of the model serving the endpoint. Stored alongside
    /// embeddings so a model swap can be detected.
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub model: ModelSource,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            model: ModelSource::default(),
            engine: EngineSettings::default(),
            embedding: EmbeddingSettings::default(),
            top_k: default_top_k(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl RagConfig {
    /// Load the YAML config file, falling back to defaults when it does
    /// not exist yet.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(RagError::internal)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(RagError::internal)
    }
}

fn default_model_id() -> String {
    "smollm2-135m-instruct".to_string()
}

fn default_engine_port() -> u16 {
    8088
}

fn default_n_ctx() -> usize {
    4096
}

fn default_n_gpu_layers() -> i32 {
    -1
}

fn default_embedding_url() -> String {
    "http://localhost:8090/embedding".to_string()
}

fn default_embedding_model() -> String {
    "mixedbread-ai/mxbai-embed-xsmall-v1".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::load(&dir.path().join("config.yml")).unwrap();
        assert_eq!(config.model_id, "smollm2-135m-instruct");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_tokens, 512);
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "model_id: custom-model\ntop_k: 5\n").unwrap();

        let config = RagConfig::load(&path).unwrap();
        assert_eq!(config.model_id, "custom-model");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.engine.port, 8088);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn paths_under_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::under(dir.path());
        assert!(paths.cache_dir.exists());
        assert!(paths.models_dir.exists());
        assert_eq!(paths.db_path, dir.path().join("localrag.db"));
    }
}
