//! Typed error for the rag-pipeline crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed query fields; rejected before any upstream call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Admission denied for this session.
    #[error("rate limit exceeded, retry in {wait_seconds}s")]
    RateLimited {
        wait_seconds: u64,
        reset_at: DateTime<Utc>,
    },

    /// Embedding provider failed, timed out or returned a wrong-sized vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector store failure.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] rag_store::RagError),

    /// Generation provider failed or timed out.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// True for upstream collaborator failures.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            PipelineError::Embedding(_) | PipelineError::Retrieval(_) | PipelineError::Generation(_)
        )
    }
}
