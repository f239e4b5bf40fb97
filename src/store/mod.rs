//! Document storage.
//!
//! A document is a short text with an optional embedding vector. Embeddings
//! may be supplied at insert time or backfilled later; they are never
//! mutated otherwise, and documents are never deleted.

mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingExtractor;
use crate::errors::RagError;

pub use sqlite::SqliteDocumentStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned, monotonically increasing.
    pub id: i64,
    pub text: String,
    /// Absent until computed. All present embeddings in one store share
    /// the extractor's dimension.
    pub embedding: Option<Vec<f32>>,
}

/// Abstract trait for document storage backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document without an embedding. Rejects empty text.
    async fn insert(&self, text: &str) -> Result<i64, RagError>;

    /// Compute the embedding first, then insert text and vector together.
    /// Nothing is stored when extraction fails.
    async fn insert_with_embedding(
        &self,
        text: &str,
        extractor: &dyn EmbeddingExtractor,
    ) -> Result<i64, RagError>;

    /// All documents, ascending by id, fully materialized.
    async fn scan_all(&self) -> Result<Vec<Document>, RagError>;

    /// Compute embeddings for every document that lacks one. Rows whose
    /// extraction fails are skipped; when any fail the call returns
    /// `RagError::PartialFailure` listing their ids, with the successful
    /// updates left in place.
    async fn backfill_embeddings(
        &self,
        extractor: &dyn EmbeddingExtractor,
    ) -> Result<usize, RagError>;

    async fn count(&self) -> Result<usize, RagError>;

    /// Tag of the extractor model that produced the stored embeddings,
    /// if any embedding has been written yet.
    async fn embedding_model(&self) -> Result<Option<String>, RagError>;
}
