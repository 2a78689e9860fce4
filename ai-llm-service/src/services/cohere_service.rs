//! Cohere embeddings client.
//!
//! - `POST {endpoint}/v1/embed` with `{ texts, model, input_type }`
//!
//! `input_type` follows [`EmbedMode`]: indexed passages use
//! `search_document`, questions and selections use `search_query`.

use std::time::Duration;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
    },
    types::EmbedMode,
};

#[derive(Debug)]
pub struct CohereService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_embed: String,
}

impl CohereService {
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not Cohere
    /// - `MissingApiKey` if `cfg.api_key` is `None`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Cohere {
            return Err(
                ProviderError::new(Provider::Cohere, ProviderErrorKind::InvalidProvider).into(),
            );
        }
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            ProviderError::new(Provider::Cohere, ProviderErrorKind::MissingApiKey)
        })?;

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::new(
                Provider::Cohere,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                ProviderError::new(
                    Provider::Cohere,
                    ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                )
            })?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.unwrap_or(30)))
            .default_headers(headers)
            .build()?;

        let url_embed = format!("{}/v1/embed", endpoint.trim_end_matches('/'));
        info!(model = %cfg.model, endpoint = %cfg.endpoint, "CohereService initialized");

        Ok(Self {
            client,
            cfg,
            url_embed,
        })
    }

    /// Embeds a batch of texts; output order matches `texts`.
    #[instrument(skip_all, fields(model = %self.cfg.model, inputs = texts.len(), mode = ?mode))]
    pub async fn embeddings(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, AiLlmError> {
        let body = EmbedRequest {
            texts,
            model: &self.cfg.model,
            input_type: mode.cohere_input_type(),
        };

        debug!("POST {}", self.url_embed);
        let resp = self.client.post(&self.url_embed).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, url = %self.url_embed, %snippet, "Cohere /v1/embed returned non-success status");
            return Err(ProviderError::new(
                Provider::Cohere,
                ProviderErrorKind::HttpStatus(HttpError {
                    status,
                    url: self.url_embed.clone(),
                    snippet,
                }),
            )
            .into());
        }

        let out: EmbedResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                Provider::Cohere,
                ProviderErrorKind::Decode(format!("serde error: {e}; expected `embeddings`")),
            )
        })?;

        if out.embeddings.len() != texts.len() {
            return Err(ProviderError::new(
                Provider::Cohere,
                ProviderErrorKind::Decode(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    out.embeddings.len()
                )),
            )
            .into());
        }
        Ok(out.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
