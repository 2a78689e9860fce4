//! Default LLM configs loaded from environment variables.
//!
//! Two roles are resolved here:
//!
//! - **Generation** → chat model used to answer questions (streaming or not)
//! - **Embedding**  → embedding model used for queries and indexed passages
//!
//! Each role picks a provider through its own kind variable and then reads the
//! provider-specific settings. Hosted providers get sensible defaults so only
//! API keys are strictly required.
//!
//! # Environment variables
//!
//! Generation:
//! - `LLM_KIND` = `openai` (default, also `gemini`) | `ollama`
//! - `GEMINI_API_KEY` or `OPENAI_API_KEY` (required for `openai`)
//! - `OPENAI_API_BASE` = API base incl. version segment
//! - `GEMINI_MODEL` / `OLLAMA_MODEL`
//! - `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`, `LLM_TIMEOUT_SECS`
//!
//! Embedding:
//! - `EMBEDDING_KIND` = `cohere` (default) | `ollama` | `openai`
//! - `COHERE_API_KEY` (required for `cohere`), `COHERE_URL`, `COHERE_MODEL`
//! - `OLLAMA_EMBEDDING_MODEL`, `OPENAI_EMBEDDING_MODEL`
//!
//! Ollama (both roles):
//! - `OLLAMA_URL` or `OLLAMA_PORT`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt, env_or, must_env,
        validate_http_endpoint, validate_range_f32,
    },
};

pub const DEFAULT_OPENAI_API_BASE: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_COHERE_URL: &str = "https://api.cohere.ai";
pub const DEFAULT_COHERE_MODEL: &str = "embed-english-v3.0";

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resolves the Ollama endpoint from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
///
/// # Errors
///
/// - [`ConfigError::MissingVar`] if both are missing
/// - [`ConfigError::InvalidNumber`] if `OLLAMA_PORT` is invalid
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            validate_http_endpoint("OLLAMA_URL", &url)?;
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            port.trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "OLLAMA_PORT",
                    reason: "expected u16 (1..=65535)",
                })?;
            return Ok(format!("http://localhost:{}", port.trim()));
        }
    }
    Err(AiLlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

fn provider_from_env(var: &'static str, default: &str) -> Result<LlmProvider, AiLlmError> {
    Ok(env_or(var, default).parse::<LlmProvider>()?)
}

/// Builds the generation config from `LLM_KIND` and friends.
///
/// # Defaults
/// - `max_tokens = 1000`
/// - `temperature = 0.7` (validated to `0.0..=2.0`)
/// - `timeout_secs = 60`
///
/// # Errors
/// - [`ConfigError::UnsupportedProvider`] for unknown kinds, including `cohere`
///   which has no chat endpoint here
/// - [`ConfigError::MissingVar`] when a required key/model is absent
pub fn config_generation() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env("LLM_KIND", "openai")?;
    let max_tokens = env_opt::<u32>("LLM_MAX_TOKENS", "expected u32")?.unwrap_or(DEFAULT_MAX_TOKENS);
    let temperature = env_opt::<f32>("LLM_TEMPERATURE", "expected f32")?.unwrap_or(DEFAULT_TEMPERATURE);
    validate_range_f32("temperature", temperature, 0.0, 2.0)?;
    let timeout_secs = env_opt::<u64>("LLM_TIMEOUT_SECS", "expected u64")?.unwrap_or(DEFAULT_TIMEOUT_SECS);

    let (model, endpoint, api_key) = match provider {
        LlmProvider::OpenAI => {
            let api_key = match must_env("GEMINI_API_KEY") {
                Ok(k) => k,
                Err(_) => must_env("OPENAI_API_KEY")
                    .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY or OPENAI_API_KEY"))?,
            };
            let endpoint = env_or("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE);
            validate_http_endpoint("OPENAI_API_BASE", &endpoint)?;
            let model = env_or("GEMINI_MODEL", DEFAULT_GENERATION_MODEL);
            (model, endpoint, Some(api_key))
        }
        LlmProvider::Ollama => (must_env("OLLAMA_MODEL")?, ollama_endpoint()?, None),
        LlmProvider::Cohere => {
            return Err(ConfigError::UnsupportedProvider("cohere (generation)".into()).into());
        }
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: Some(max_tokens),
        temperature: Some(temperature),
        top_p: None,
        timeout_secs: Some(timeout_secs),
    })
}

/// Builds the embedding config from `EMBEDDING_KIND` and friends.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `max_tokens = None`
/// - `timeout_secs = 30`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env("EMBEDDING_KIND", "cohere")?;

    let (model, endpoint, api_key) = match provider {
        LlmProvider::Cohere => {
            let endpoint = env_or("COHERE_URL", DEFAULT_COHERE_URL);
            validate_http_endpoint("COHERE_URL", &endpoint)?;
            (
                env_or("COHERE_MODEL", DEFAULT_COHERE_MODEL),
                endpoint,
                Some(must_env("COHERE_API_KEY")?),
            )
        }
        LlmProvider::Ollama => (
            must_env("OLLAMA_EMBEDDING_MODEL")?,
            ollama_endpoint()?,
            None,
        ),
        LlmProvider::OpenAI => {
            let endpoint = env_or("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE);
            validate_http_endpoint("OPENAI_API_BASE", &endpoint)?;
            (
                must_env("OPENAI_EMBEDDING_MODEL")?,
                endpoint,
                Some(must_env("OPENAI_API_KEY")?),
            )
        }
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}
