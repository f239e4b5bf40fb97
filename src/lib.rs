//! Retrieval-augmented generation core for a fully local stack.
//!
//! Documents and their embeddings live in a SQLite store and are ranked
//! by brute-force cosine similarity. The inference engine is expensive to
//! bring up, so a cache-gated lifecycle owns the single instance and the
//! pipeline ties retrieval to generation on top of it.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod retrieval;
pub mod store;
pub mod weights;

pub use cache::{CacheLookup, ModelCacheManager, ModelCacheRecord};
pub use config::{AppPaths, RagConfig};
pub use engine::{EngineLifecycle, EngineState, ProgressLog};
pub use errors::RagError;
pub use pipeline::RagPipeline;
pub use retrieval::{Retriever, ScoredDocument};
pub use store::{Document, DocumentStore, SqliteDocumentStore};
