use std::sync::Arc;

use ai_llm_service::{
    config::default_config::{config_embedding, config_generation},
    service_profiles::LlmServiceProfiles,
};
use rag_pipeline::{PipelineConfig, RagPipeline, RateLimitConfig, RateLimiter};
use rag_store::{RagConfig, RagStore, VectorStore};
use tracing::info;

use crate::error_handler::AppResult;

const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Query pipeline; owns the rate limiter.
    pub pipeline: Arc<RagPipeline>,
    /// Passage store, probed by `/health`.
    pub store: Arc<dyn VectorStore>,
    /// Provider clients, probed by `/health`.
    pub llm: Arc<LlmServiceProfiles>,
}

impl AppState {
    /// Load shared state from environment variables.
    ///
    /// # Errors
    /// Missing or malformed provider/store configuration.
    pub fn from_env() -> AppResult<Self> {
        let generation = config_generation()?;
        let embedding = config_embedding()?;
        info!(
            generation = %generation.model,
            embedding = %embedding.model,
            "llm profiles loaded"
        );
        let llm = Arc::new(LlmServiceProfiles::new(
            generation,
            embedding,
            Some(HEALTH_TIMEOUT_SECS),
        )?);

        let rag_cfg = RagConfig::from_env()?;
        info!(collection = %rag_cfg.collection, url = %rag_cfg.qdrant_url, "vector store configured");
        let store: Arc<dyn VectorStore> = Arc::new(RagStore::new(rag_cfg)?);

        let limits = RateLimitConfig::from_env();
        info!(
            max_queries = limits.max_queries,
            window_seconds = limits.window_seconds,
            "rate limiter configured"
        );
        let limiter = Arc::new(RateLimiter::new(limits));
        let pipeline = Arc::new(RagPipeline::new(
            PipelineConfig::from_env(),
            limiter,
            llm.clone(),
            store.clone(),
            llm.clone(),
        ));

        Ok(Self {
            pipeline,
            store,
            llm,
        })
    }
}
