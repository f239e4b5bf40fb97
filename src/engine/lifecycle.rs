use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use super::{ChatMessage, EngineLoader, InferenceEngine, ProgressLog};
use crate::cache::{CacheLookup, ModelCacheManager};
use crate::errors::RagError;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Observable lifecycle state of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal until a caller re-invokes `init`.
    Failed(String),
}

struct Slot {
    state: EngineState,
    engine: Option<Arc<dyn InferenceEngine>>,
}

/// Owns the one engine instance of the process.
///
/// `init` is idempotent once ready, and at most one initialization runs
/// at a time: a second caller arriving mid-init awaits the same attempt
/// and observes its outcome instead of starting another model load.
pub struct EngineLifecycle {
    loader: Arc<dyn EngineLoader>,
    cache: ModelCacheManager,
    model_id: String,
    progress: ProgressLog,
    init_lock: AsyncMutex<()>,
    slot: std::sync::Mutex<Slot>,
}

impl EngineLifecycle {
    pub fn new(loader: Arc<dyn EngineLoader>, cache: ModelCacheManager, model_id: String) -> Self {
        Self {
            loader,
            cache,
            model_id,
            progress: ProgressLog::new(),
            init_lock: AsyncMutex::new(()),
            slot: std::sync::Mutex::new(Slot {
                state: EngineState::Uninitialized,
                engine: None,
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn progress(&self) -> &ProgressLog {
        &self.progress
    }

    pub fn state(&self) -> EngineState {
        self.slot.lock().expect("engine slot poisoned").state.clone()
    }

    fn ready_engine(&self) -> Option<Arc<dyn InferenceEngine>> {
        let slot = self.slot.lock().expect("engine slot poisoned");
        match slot.state {
            EngineState::Ready => slot.engine.clone(),
            _ => None,
        }
    }

    fn set_state(&self, state: EngineState, engine: Option<Arc<dyn InferenceEngine>>) {
        let mut slot = self.slot.lock().expect("engine slot poisoned");
        slot.state = state;
        slot.engine = engine;
    }

    /// Bring the engine up, or return the existing handle when already
    /// ready.
    pub async fn init(&self) -> Result<Arc<dyn InferenceEngine>, RagError> {
        if let Some(engine) = self.ready_engine() {
            return Ok(engine);
        }

        let _guard = self.init_lock.lock().await;

        // A concurrent caller may have finished initialization while we
        // waited for the lock.
        if let Some(engine) = self.ready_engine() {
            return Ok(engine);
        }

        self.set_state(EngineState::Initializing, None);

        let was_cached = match self.cache.lookup(&self.model_id).await {
            CacheLookup::Hit(record) => {
                self.progress.append(format!(
                    "Found cached model {}, loading... ({})",
                    self.model_id,
                    record.describe()
                ));
                true
            }
            CacheLookup::Miss => {
                self.progress
                    .append(format!("Model {} not cached, downloading...", self.model_id));
                false
            }
            CacheLookup::Degraded(reason) => {
                self.progress.append(format!(
                    "Cache unavailable ({}), assuming fresh download",
                    reason
                ));
                false
            }
        };

        match self.loader.load(&self.model_id, &self.progress).await {
            Ok(engine) => {
                if !was_cached && self.cache.cache(&self.model_id).await {
                    self.progress.append("Model cached for future use");
                }
                self.set_state(EngineState::Ready, Some(engine.clone()));
                self.progress.append("Engine ready");
                Ok(engine)
            }
            Err(err) => {
                tracing::error!("engine initialization failed: {}", err);
                self.set_state(EngineState::Failed(err.to_string()), None);
                self.progress
                    .append(format!("Engine initialization failed: {}", err));
                Err(err)
            }
        }
    }

    /// Run one chat completion with a fixed system role and the caller's
    /// prompt as the user message. Returns the first choice's text, or an
    /// empty string when the backend produced no choices.
    pub async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let engine = self.ready_engine().ok_or(RagError::NotInitialized)?;

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = engine.chat(messages).await?;
        Ok(completion.first_text().unwrap_or_default().to_string())
    }
}
