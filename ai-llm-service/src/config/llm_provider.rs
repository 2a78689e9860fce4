use std::str::FromStr;

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for inference or embeddings.
///
/// - `Ollama`: local Ollama runtime (chat + embeddings).
/// - `OpenAI`: any OpenAI-compatible REST API, including Gemini's
///   `/v1beta/openai` compatibility layer (chat + embeddings).
/// - `Cohere`: Cohere embed API (embeddings only, supports query/document modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI-compatible chat/embeddings API.
    OpenAI,
    /// Cohere embeddings API.
    Cohere,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    /// Parses the value of `LLM_KIND` / `EMBEDDING_KIND` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "chatgpt" | "gemini" => Ok(Self::OpenAI),
            "cohere" => Ok(Self::Cohere),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}
