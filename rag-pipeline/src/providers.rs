//! Provider seams for embeddings and generation.
//!
//! The pipeline only sees these traits; production wires them to
//! [`LlmServiceProfiles`], tests to in-memory fakes.

use ai_llm_service::error_handler::AiLlmError;
use ai_llm_service::service_profiles::LlmServiceProfiles;
use ai_llm_service::services::TextStream;
use ai_llm_service::types::{ChatMessage, EmbedMode};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, AiLlmError>;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError>;

    /// Ordered, finite stream of text fragments.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, AiLlmError>;
}

#[async_trait]
impl EmbeddingProvider for LlmServiceProfiles {
    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, AiLlmError> {
        LlmServiceProfiles::embed(self, texts, mode).await
    }
}

#[async_trait]
impl GenerationProvider for LlmServiceProfiles {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        self.chat(messages).await
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, AiLlmError> {
        self.chat_stream(messages).await
    }
}
