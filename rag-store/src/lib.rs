//! Textbook passage store over Qdrant.
//!
//! This crate provides:
//! - [`RagStore`], the facade application code holds
//! - [`VectorStore`], the async seam the query pipeline depends on
//! - the passage payload model shared by the indexer and the pipeline

mod config;
mod errors;
mod filters;
mod qdrant_facade;
mod record;

pub use config::{DistanceKind, RagConfig};
pub use errors::RagError;
pub use record::{CollectionStats, PassagePayload, RagFilter, StoredHit};

use async_trait::async_trait;
use tracing::trace;

/// Vector store contract consumed by retrieval.
///
/// `search` returns hits with `score >= score_threshold`, ordered by
/// descending score, at most `limit` of them.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent; tolerant of concurrent creation.
    async fn ensure_collection(&self) -> Result<(), RagError>;

    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: &PassagePayload,
    ) -> Result<(), RagError>;

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<StoredHit>, RagError>;

    async fn stats(&self) -> Result<CollectionStats, RagError>;
}

/// High-level facade that wires configuration and Qdrant client.
pub struct RagStore {
    cfg: RagConfig,
    client: qdrant_facade::QdrantFacade,
}

impl RagStore {
    /// # Errors
    /// Returns `RagError::Config` if the config is invalid or the client cannot be built.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        trace!("RagStore::new collection={}", cfg.collection);
        let client = qdrant_facade::QdrantFacade::new(&cfg)?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }
}

#[async_trait]
impl VectorStore for RagStore {
    async fn ensure_collection(&self) -> Result<(), RagError> {
        self.client.ensure_collection().await
    }

    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: &PassagePayload,
    ) -> Result<(), RagError> {
        self.client.upsert(id, vector, payload).await
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
        filter: Option<&RagFilter>,
    ) -> Result<Vec<StoredHit>, RagError> {
        trace!("RagStore::search limit={limit} threshold={score_threshold}");
        if vector.len() != self.cfg.vector_size {
            return Err(RagError::VectorSizeMismatch {
                got: vector.len(),
                want: self.cfg.vector_size,
            });
        }
        let qfilter = filter.map(filters::to_qdrant_filter);
        self.client
            .search(vector, limit, score_threshold, qfilter)
            .await
    }

    async fn stats(&self) -> Result<CollectionStats, RagError> {
        self.client.stats().await
    }
}
