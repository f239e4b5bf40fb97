//! llama-server backed inference engine.
//!
//! The engine owns a spawned `llama-server` child process and talks to
//! its OpenAI-compatible chat endpoint. Server log lines emitted during
//! startup are forwarded to the progress log.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{
    ChatChoice, ChatCompletion, ChatMessage, EngineLoader, GenerationParams, InferenceEngine,
    ProgressLog,
};
use crate::config::{AppPaths, EngineSettings, ModelSource, RagConfig};
use crate::errors::RagError;
use crate::weights::WeightsFetcher;

const MAX_HEALTH_RETRIES: u32 = 30;

#[derive(Debug)]
pub struct LlamaServerEngine {
    client: Client,
    port: u16,
    params: GenerationParams,
    child: Mutex<Option<Child>>,
}

impl LlamaServerEngine {
    /// Spawn llama-server on the given model and wait until it answers
    /// health checks.
    pub async fn start(
        binary: &Path,
        model_path: &Path,
        settings: &EngineSettings,
        params: GenerationParams,
        progress: &ProgressLog,
    ) -> Result<Self, RagError> {
        let port = settings.port;

        let mut cmd = Command::new(binary);
        cmd.arg("-m").arg(model_path);
        cmd.arg("--port").arg(port.to_string());
        cmd.arg("-c").arg(settings.n_ctx.to_string());
        if settings.n_gpu_layers >= 0 {
            cmd.arg("-ngl").arg(settings.n_gpu_layers.to_string());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        progress.append(format!("Starting inference backend on port {}", port));

        let mut child = cmd
            .spawn()
            .map_err(|e| RagError::internal(format!("failed to spawn llama-server: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            let log = progress.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    log.append(line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let log = progress.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    log.append(line);
                }
            });
        }

        let engine = Self {
            client: Client::new(),
            port,
            params,
            child: Mutex::new(Some(child)),
        };

        engine.wait_for_health().await?;
        progress.append("Inference backend is healthy".to_string());

        Ok(engine)
    }

    async fn wait_for_health(&self) -> Result<(), RagError> {
        let url = format!("http://localhost:{}/health", self.port);
        for _ in 0..MAX_HEALTH_RETRIES {
            if self.client.get(&url).send().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(RagError::internal("timed out waiting for llama-server"))
    }

    pub async fn shutdown(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
        }
    }
}

#[async_trait]
impl InferenceEngine for LlamaServerEngine {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion, RagError> {
        let url = format!("http://localhost:{}/v1/chat/completions", self.port);

        let body = json!({
            "messages": messages,
            "stream": false,
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!(
                "llama-server chat error {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::internal)?;
        let choices = payload["choices"]
            .as_array()
            .map(|choices| {
                choices
                    .iter()
                    .map(|choice| ChatChoice {
                        content: choice["message"]["content"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChatCompletion { choices })
    }
}

/// Production loader: provisions weights, then brings up llama-server.
pub struct LlamaServerLoader {
    fetcher: WeightsFetcher,
    source: ModelSource,
    settings: EngineSettings,
    params: GenerationParams,
    binary: PathBuf,
}

impl LlamaServerLoader {
    pub fn new(paths: &AppPaths, config: &RagConfig) -> Self {
        let binary = find_server_binary(config.engine.binary.as_deref());
        Self {
            fetcher: WeightsFetcher::new(paths),
            source: config.model.clone(),
            settings: config.engine.clone(),
            params: GenerationParams {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            binary,
        }
    }
}

#[async_trait]
impl EngineLoader for LlamaServerLoader {
    async fn load(
        &self,
        model_id: &str,
        progress: &ProgressLog,
    ) -> Result<std::sync::Arc<dyn InferenceEngine>, RagError> {
        progress.append(format!("Preparing model {}", model_id));

        let model_path = self.fetcher.ensure_local(&self.source, progress).await?;
        let engine = LlamaServerEngine::start(
            &self.binary,
            &model_path,
            &self.settings,
            self.params.clone(),
            progress,
        )
        .await?;

        Ok(std::sync::Arc::new(engine))
    }
}

fn find_server_binary(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    if let Ok(found) = which::which("llama-server") {
        return found;
    }
    PathBuf::from("llama-server")
}
