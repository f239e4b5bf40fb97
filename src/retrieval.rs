//! Top-k similarity retrieval over the document store.
//!
//! Brute-force scoring: embed the query, scan every document, rank by
//! cosine similarity. O(n * D) per query, acceptable for the small
//! single-process corpora this crate targets.

use std::sync::Arc;

use crate::embedding::EmbeddingExtractor;
use crate::errors::RagError;
use crate::store::{Document, DocumentStore};

/// A document paired with its relevance score for one query. Ephemeral;
/// never persisted.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    /// Cosine similarity in [-1, 1], or `f32::NEG_INFINITY` when the
    /// document has no embedding (or a zero-norm one).
    pub score: f32,
}

pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn EmbeddingExtractor>,
}

impl Retriever {
    pub fn new(store: Arc<dyn DocumentStore>, extractor: Arc<dyn EmbeddingExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Return the `min(k, document count)` most similar documents,
    /// descending by score, ties broken by ascending id so repeated calls
    /// over the same data produce the same ordering.
    ///
    /// Documents without an embedding score `NEG_INFINITY` and therefore
    /// rank below every document with a real vector, but are never
    /// excluded from the candidate set.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, RagError> {
        if k == 0 {
            return Err(RagError::Validation("k must be at least 1".to_string()));
        }

        let query_embedding = self.extractor.extract(query).await?;
        let documents = self.store.scan_all().await?;

        let mut scored: Vec<ScoredDocument> = documents
            .into_iter()
            .map(|document| {
                let score = match &document.embedding {
                    Some(embedding) => cosine_similarity(&query_embedding, embedding),
                    None => f32::NEG_INFINITY,
                };
                ScoredDocument { document, score }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        scored.truncate(k);

        Ok(scored)
    }
}

/// Cosine similarity clamped to [-1, 1]. Zero-norm or mismatched-length
/// inputs score `NEG_INFINITY`: a worst-possible match rather than an
/// excluded one, preserving a total order over all documents.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::NEG_INFINITY;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        f32::NEG_INFINITY
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::store::SqliteDocumentStore;

    async fn test_store() -> Arc<SqliteDocumentStore> {
        let tmp = std::env::temp_dir().join(format!(
            "localrag-retrieval-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        Arc::new(SqliteDocumentStore::with_path(tmp).await.unwrap())
    }

    /// Maps a few known texts to fixed vectors; everything else gets a
    /// constant fallback. Deterministic by construction.
    struct StubExtractor;

    #[async_trait]
    impl EmbeddingExtractor for StubExtractor {
        fn model_tag(&self) -> &str {
            "stub-extractor"
        }

        async fn extract(&self, text: &str) -> Result<Vec<f32>, RagError> {
            Ok(match text {
                "Bob likes the color green" => vec![0.9, 0.1, 0.0],
                "Alice prefers blue" => vec![0.0, 0.1, 0.9],
                "What color does Bob like?" => vec![1.0, 0.0, 0.0],
                "east" => vec![1.0, 0.0, 0.0],
                "north" => vec![0.0, 1.0, 0.0],
                "northeast" => vec![1.0, 1.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            })
        }
    }

    #[tokio::test]
    async fn rejects_zero_k() {
        let store = test_store().await;
        let retriever = Retriever::new(store, Arc::new(StubExtractor));

        let err = retriever.retrieve("anything", 0).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn returns_min_of_k_and_document_count() {
        let store = test_store().await;
        store
            .insert_with_embedding("east", &StubExtractor)
            .await
            .unwrap();
        store
            .insert_with_embedding("north", &StubExtractor)
            .await
            .unwrap();

        let retriever = Retriever::new(store, Arc::new(StubExtractor));

        let five = retriever.retrieve("east", 5).await.unwrap();
        assert_eq!(five.len(), 2);

        let one = retriever.retrieve("east", 1).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].document.text, "east");
    }

    #[tokio::test]
    async fn orders_descending_with_id_tiebreak() {
        let store = test_store().await;
        // Two documents with identical vectors tie on every query; the
        // lower id must come first.
        let first = store
            .insert_with_embedding("east", &StubExtractor)
            .await
            .unwrap();
        let second = store
            .insert_with_embedding("east", &StubExtractor)
            .await
            .unwrap();
        store
            .insert_with_embedding("north", &StubExtractor)
            .await
            .unwrap();

        let retriever = Retriever::new(store, Arc::new(StubExtractor));
        let results = retriever.retrieve("east", 3).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document.id, first);
        assert_eq!(results[1].document.id, second);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn repeated_calls_return_identical_results() {
        let store = test_store().await;
        for text in ["east", "north", "northeast"] {
            store
                .insert_with_embedding(text, &StubExtractor)
                .await
                .unwrap();
        }

        let retriever = Retriever::new(store, Arc::new(StubExtractor));

        let a = retriever.retrieve("northeast", 3).await.unwrap();
        let b = retriever.retrieve("northeast", 3).await.unwrap();

        let ids_a: Vec<i64> = a.iter().map(|r| r.document.id).collect();
        let ids_b: Vec<i64> = b.iter().map(|r| r.document.id).collect();
        assert_eq!(ids_a, ids_b);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.score, y.score);
        }
    }

    #[tokio::test]
    async fn absent_embedding_ranks_below_every_real_one() {
        let store = test_store().await;
        store.insert("no embedding yet").await.unwrap();
        store
            .insert_with_embedding("north", &StubExtractor)
            .await
            .unwrap();
        store
            .insert_with_embedding("east", &StubExtractor)
            .await
            .unwrap();

        let retriever = Retriever::new(store, Arc::new(StubExtractor));
        let results = retriever.retrieve("east", 3).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[2].document.text, "no embedding yet");
        assert_eq!(results[2].score, f32::NEG_INFINITY);
        assert!(results[0].score > f32::NEG_INFINITY);
        assert!(results[1].score > f32::NEG_INFINITY);
    }

    #[tokio::test]
    async fn bob_document_wins_for_bob_query() {
        let store = test_store().await;
        store
            .insert_with_embedding("Bob likes the color green", &StubExtractor)
            .await
            .unwrap();
        store
            .insert_with_embedding("Alice prefers blue", &StubExtractor)
            .await
            .unwrap();

        let retriever = Retriever::new(store, Arc::new(StubExtractor));
        let results = retriever
            .retrieve("What color does Bob like?", 1)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.text, "Bob likes the color green");
    }

    #[test]
    fn cosine_identical_vectors_score_one() {
        let v = vec![0.3, -0.4, 0.5];
        let score = cosine_similarity(&v, &v);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_stays_within_bounds() {
        let pairs = [
            (vec![1.0, 0.0], vec![0.0, 1.0]),
            (vec![1.0, 1.0], vec![-1.0, -1.0]),
            (vec![0.5, 0.2], vec![0.1, 0.9]),
        ];
        for (a, b) in pairs {
            let score = cosine_similarity(&a, &b);
            assert!((-1.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn cosine_zero_norm_is_negative_infinity() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]),
            f32::NEG_INFINITY
        );
        assert_eq!(
            cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]),
            f32::NEG_INFINITY
        );
    }

    #[test]
    fn cosine_opposite_vectors_score_minus_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6);
    }
}
