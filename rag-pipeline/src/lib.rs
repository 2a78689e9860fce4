//! Textbook question answering over retrieved passages.
//!
//! Request flow: [`RateLimiter`] admission, question embedding, hybrid
//! retrieval, grounded generation (complete or streamed), citation
//! extraction and response assembly in [`RagPipeline`].

pub mod cfg;
pub mod citations;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod rate_limiter;
pub mod retrieval;

#[cfg(test)]
mod test_support;

pub use cfg::{PipelineConfig, RateLimitConfig};
pub use error::PipelineError;
pub use models::{
    Citation, Message, MessageRole, Query, RateLimitInfo, Response, ResponseStatus,
    RetrievedPassage, StreamEvent,
};
pub use pipeline::{NOT_FOUND_MESSAGE, RagPipeline};
pub use providers::{EmbeddingProvider, GenerationProvider};
pub use rate_limiter::RateLimiter;

pub type Result<T> = std::result::Result<T, PipelineError>;
