//! Inference engine abstraction and lifecycle.
//!
//! The engine itself (a chat-completion backend) is expensive to bring
//! up: weights may need downloading and the backend takes a while to
//! warm. `EngineLifecycle` owns exactly one engine instance, gates its
//! construction on the model cache, and guarantees at most one
//! initialization in flight.

mod lifecycle;
mod llama;
mod progress;
mod types;

use async_trait::async_trait;

use crate::errors::RagError;

pub use lifecycle::{EngineLifecycle, EngineState};
pub use llama::{LlamaServerEngine, LlamaServerLoader};
pub use progress::ProgressLog;
pub use types::{ChatChoice, ChatCompletion, ChatMessage, GenerationParams};

/// A ready chat-completion backend.
#[async_trait]
pub trait InferenceEngine: Send + Sync + std::fmt::Debug {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion, RagError>;
}

/// Constructs an engine for a model id, reporting progress as it goes.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        model_id: &str,
        progress: &ProgressLog,
    ) -> Result<std::sync::Arc<dyn InferenceEngine>, RagError>;
}
