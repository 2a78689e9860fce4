//! Embedding gateway: one text in, one vector of the configured size out.

use std::sync::Arc;
use std::time::Duration;

use ai_llm_service::types::EmbedMode;
use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::providers::EmbeddingProvider;

pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    timeout: Duration,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize, timeout: Duration) -> Self {
        Self {
            provider,
            dimension,
            timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed_for_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.embed(text, EmbedMode::Query).await
    }

    pub async fn embed_for_document(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.embed(text, EmbedMode::Document).await
    }

    /// # Errors
    /// - `InvalidInput` for blank text
    /// - `Embedding` on upstream failure, timeout, or a vector of the wrong length
    #[instrument(level = "debug", skip(self, text), fields(chars = text.len(), ?mode))]
    pub async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("cannot embed empty text".into()));
        }
        let batch = [text.to_string()];
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed(&batch, mode))
            .await
            .map_err(|_| {
                PipelineError::Embedding(format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| PipelineError::Embedding(e.to_string()))?;

        let [vector]: [Vec<f32>; 1] = vectors.try_into().map_err(|v: Vec<Vec<f32>>| {
            PipelineError::Embedding(format!("expected 1 vector, got {}", v.len()))
        })?;
        if vector.len() != self.dimension {
            return Err(PipelineError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }
        debug!(dim = vector.len(), "embedded");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeEmbedder;

    fn gateway(embedder: FakeEmbedder, dim: usize) -> EmbeddingGateway {
        EmbeddingGateway::new(Arc::new(embedder), dim, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn returns_vector_of_configured_size() {
        let g = gateway(FakeEmbedder::new(4).tag("robot arm", 0.5), 4);
        let v = g.embed_for_query("robot arm").await.expect("vector");
        assert_eq!(v, vec![0.5; 4]);
    }

    #[tokio::test]
    async fn blank_text_is_invalid_input() {
        let g = gateway(FakeEmbedder::new(4), 4);
        let err = g.embed_for_document("  \t").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_provider_error() {
        let g = gateway(FakeEmbedder::new(3), 4);
        let err = g.embed_for_query("q").await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
        assert!(err.is_provider());
    }

    #[tokio::test]
    async fn vector_count_must_match_input() {
        for n in [0, 2] {
            let g = gateway(FakeEmbedder::new(4).vectors_per_text(n), 4);
            let err = g.embed_for_query("q").await.unwrap_err();
            assert!(matches!(err, PipelineError::Embedding(_)), "{n} vectors");
        }
    }

    #[tokio::test]
    async fn upstream_failure_is_provider_error() {
        let g = gateway(FakeEmbedder::new(4).fail_on("boom"), 4);
        let err = g.embed_for_query("boom").await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));
    }

    #[tokio::test]
    async fn passes_encoding_mode_through() {
        let fake = Arc::new(FakeEmbedder::new(2));
        let g = EmbeddingGateway::new(fake.clone(), 2, Duration::from_secs(5));
        g.embed_for_document("page").await.expect("doc");
        g.embed_for_query("question").await.expect("query");
        assert_eq!(fake.modes(), vec![EmbedMode::Document, EmbedMode::Query]);
    }
}
