use crate::config::llm_provider::LlmProvider;

/// Configuration for an LLM model invocation.
///
/// # Fields
///
/// - `provider`: Which backend to use (Ollama, OpenAI-compatible, Cohere).
/// - `model`: The model identifier (e.g., `"gemini-2.5-flash"`, `"embed-english-v3.0"`).
/// - `endpoint`: API base. For OpenAI-compatible providers it includes the
///   version segment (e.g. `https://api.openai.com/v1`).
/// - `api_key`: Optional API key for providers that require authentication.
/// - `max_tokens`: Token budget for generation (if supported).
/// - `temperature`: Sampling temperature (0.0 = deterministic).
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Optional request timeout in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Inference endpoint (local URL or remote API base).
    pub endpoint: String,

    /// Optional API key for authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}
