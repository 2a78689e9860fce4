//! Shared LLM service with two profiles: `generation` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::config::default_config::{config_embedding, config_generation};
//! use ai_llm_service::service_profiles::LlmServiceProfiles;
//! use ai_llm_service::types::{ChatMessage, EmbedMode};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ai_llm_service::error_handler::AiLlmError> {
//! let svc = Arc::new(LlmServiceProfiles::new(
//!     config_generation()?,
//!     config_embedding()?,
//!     Some(10),
//! )?);
//!
//! let answer = svc.chat(&[ChatMessage::user("What is a servo?")]).await?;
//! let vectors = svc.embed(&["servo".to_string()], EmbedMode::Query).await?;
//! # let _ = (answer, vectors);
//! # Ok(()) }
//! ```

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, Provider, ProviderError, ProviderErrorKind},
    health_service::{HealthService, HealthStatus},
    services::{
        TextStream, cohere_service::CohereService, ollama_service::OllamaService,
        open_ai_service::OpenAiService,
    },
    types::{ChatMessage, EmbedMode},
};

/// Manages the **generation** and **embedding** profiles.
pub struct LlmServiceProfiles {
    generation: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
    cohere: RwLock<HashMap<ClientKey, Arc<CohereService>>>,

    health: HealthService,
}

impl LlmServiceProfiles {
    pub fn new(
        generation: LlmModelConfig,
        embedding: LlmModelConfig,
        health_timeout_secs: Option<u64>,
    ) -> Result<Self, AiLlmError> {
        Ok(Self {
            generation,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            cohere: RwLock::new(HashMap::new()),
            health: HealthService::new(health_timeout_secs)?,
        })
    }

    /// Complete (non-streaming) chat with the generation profile.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        let cfg = &self.generation;
        match cfg.provider {
            LlmProvider::Ollama => {
                cached(&self.ollama, cfg, OllamaService::new)
                    .await?
                    .chat(messages)
                    .await
            }
            LlmProvider::OpenAI => {
                cached(&self.openai, cfg, OpenAiService::new)
                    .await?
                    .chat(messages)
                    .await
            }
            LlmProvider::Cohere => Err(unsupported("chat")),
        }
    }

    /// Streaming chat with the generation profile.
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream, AiLlmError> {
        let cfg = &self.generation;
        match cfg.provider {
            LlmProvider::Ollama => {
                cached(&self.ollama, cfg, OllamaService::new)
                    .await?
                    .chat_stream(messages)
                    .await
            }
            LlmProvider::OpenAI => {
                cached(&self.openai, cfg, OpenAiService::new)
                    .await?
                    .chat_stream(messages)
                    .await
            }
            LlmProvider::Cohere => Err(unsupported("chat_stream")),
        }
    }

    /// Embeds a batch with the embedding profile; `mode` matters for Cohere only.
    pub async fn embed(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, AiLlmError> {
        let cfg = &self.embedding;
        match cfg.provider {
            LlmProvider::Ollama => {
                cached(&self.ollama, cfg, OllamaService::new)
                    .await?
                    .embeddings(texts)
                    .await
            }
            LlmProvider::OpenAI => {
                cached(&self.openai, cfg, OpenAiService::new)
                    .await?
                    .embeddings(texts)
                    .await
            }
            LlmProvider::Cohere => {
                cached(&self.cohere, cfg, CohereService::new)
                    .await?
                    .embeddings(texts, mode)
                    .await
            }
        }
    }

    /// Health snapshot for both profiles (once if they are identical).
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = vec![self.generation.clone()];
        if self.embedding != self.generation {
            list.push(self.embedding.clone());
        }
        self.health.check_many(&list).await
    }

    /// Returns `(generation, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.generation, &self.embedding)
    }
}

fn unsupported(op: &'static str) -> AiLlmError {
    ProviderError::new(Provider::Cohere, ProviderErrorKind::Unsupported(op)).into()
}

/// Returns a cached client for `cfg`, building it on first use.
async fn cached<T>(
    map: &RwLock<HashMap<ClientKey, Arc<T>>>,
    cfg: &LlmModelConfig,
    build: fn(LlmModelConfig) -> Result<T, AiLlmError>,
) -> Result<Arc<T>, AiLlmError> {
    let key = ClientKey::from(cfg);
    if let Some(cli) = map.read().await.get(&key).cloned() {
        return Ok(cli);
    }
    let mut w = map.write().await;
    if let Some(cli) = w.get(&key).cloned() {
        return Ok(cli);
    }
    let cli = Arc::new(build(cfg.clone())?);
    w.insert(key, cli.clone());
    Ok(cli)
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}
