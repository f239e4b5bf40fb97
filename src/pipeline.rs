//! Query orchestration: retrieval feeds a grounded prompt to the engine.

use std::sync::Arc;

use crate::engine::EngineLifecycle;
use crate::errors::RagError;
use crate::retrieval::Retriever;
use crate::store::DocumentStore;

/// Separator between retrieved documents inside the context block.
const CONTEXT_DELIMITER: &str = "\n---\n";

pub struct RagPipeline {
    retriever: Retriever,
    engine: Arc<EngineLifecycle>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, engine: Arc<EngineLifecycle>) -> Self {
        Self { retriever, engine }
    }

    /// Answer a query grounded in the top-k most similar documents.
    ///
    /// Retrieval runs to completion before generation starts. Errors from
    /// either stage surface as-is; nothing is retried or masked here. An
    /// empty store is not an error: the prompt simply carries an empty
    /// context block.
    pub async fn rag_query(&self, query: &str, k: usize) -> Result<String, RagError> {
        let docs = self.retriever.retrieve(query, k).await?;
        tracing::info!("retrieved {} document(s) for query", docs.len());

        let context = docs
            .iter()
            .map(|scored| scored.document.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER);

        let prompt = build_prompt(&context, query);
        self.engine.generate(&prompt).await
    }
}

fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the question.\n\n\
         Context:\n{}\n\nQuestion: {}\nAnswer:",
        context, query
    )
}

/// Insert the given texts with auto-computed embeddings when the store is
/// empty. Returns how many documents were inserted.
pub async fn seed_documents(
    store: &dyn DocumentStore,
    extractor: &dyn crate::embedding::EmbeddingExtractor,
    texts: &[&str],
) -> Result<usize, RagError> {
    if store.count().await? > 0 {
        return Ok(0);
    }

    for text in texts {
        store.insert_with_embedding(text, extractor).await?;
    }
    Ok(texts.len())
}
