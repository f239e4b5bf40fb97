use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::RagError;

/// Converts text into a fixed-dimension embedding vector.
///
/// Implementations must be deterministic for identical input and model
/// version. Vectors produced by different models are not comparable;
/// `model_tag` identifies which model produced a vector so the store can
/// detect a swap.
#[async_trait]
pub trait EmbeddingExtractor: Send + Sync {
    fn model_tag(&self) -> &str;

    async fn extract(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Extractor backed by a llama-server style `/embedding` HTTP endpoint.
///
/// The backend applies mean pooling; the raw vector is L2-normalized here
/// before it is returned, so downstream cosine similarity is effectively a
/// dot product. Callers should not rely on that and compute full cosine
/// similarity anyway.
#[derive(Clone)]
pub struct HttpEmbeddingExtractor {
    url: String,
    model_tag: String,
    client: Client,
}

impl HttpEmbeddingExtractor {
    pub fn new(url: String, model_tag: String) -> Self {
        Self {
            url,
            model_tag,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingExtractor for HttpEmbeddingExtractor {
    fn model_tag(&self) -> &str {
        &self.model_tag
    }

    async fn extract(&self, text: &str) -> Result<Vec<f32>, RagError> {
        // Policy: whitespace-only input is rejected rather than embedded.
        if text.trim().is_empty() {
            return Err(RagError::Extraction(
                "input text is empty after trimming".to_string(),
            ));
        }

        let body = json!({ "content": text });

        let res = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::extraction)?;

        if !res.status().is_success() {
            return Err(RagError::Extraction(format!(
                "embedding backend returned {}",
                res.status()
            )));
        }

        let data: Value = res.json().await.map_err(RagError::extraction)?;
        let embedding: Vec<f32> = serde_json::from_value(data["embedding"].clone())
            .map_err(|_| RagError::Extraction("invalid embedding response".to_string()))?;

        if embedding.is_empty() {
            return Err(RagError::Extraction(
                "embedding backend returned an empty vector".to_string(),
            ));
        }

        Ok(l2_normalize(embedding))
    }
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_untouched() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_request() {
        let extractor = HttpEmbeddingExtractor::new(
            "http://localhost:1/embedding".to_string(),
            "test-model".to_string(),
        );

        let err = extractor.extract("   \n\t").await.unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }
}
