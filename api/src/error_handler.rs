use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rag_pipeline::PipelineError;
use serde::Serialize;
use thiserror::Error;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error(transparent)]
    Config(#[from] ai_llm_service::error_handler::AiLlmError),

    #[error(transparent)]
    Store(#[from] rag_store::RagError),

    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / admission ---
    #[error("{0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded. Please wait {wait_seconds} seconds before trying again.")]
    RateLimited {
        wait_seconds: u64,
        reset_at: DateTime<Utc>,
    },

    /// Rich HTTP error mapped from lower layers with specific status & code.
    #[error("{message}")]
    Http {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Http { status, .. } => *status,
            // startup-only
            AppError::Config(_) | AppError::Store(_) | AppError::Bind(_) | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Store(_) => "store_error",
            AppError::Bind(_) => "bind_error",
            AppError::Server(_) => "server_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::RateLimited { .. } => "rate_limit_exceeded",
            AppError::Http { code, .. } => code,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_at: Option<DateTime<Utc>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (retry_after, reset_at) = match &self {
            AppError::RateLimited {
                wait_seconds,
                reset_at,
            } => (Some(*wait_seconds), Some(*reset_at)),
            _ => (None, None),
        };
        let body = ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
            retry_after,
            reset_at,
        };
        let mut res = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        res
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::InvalidInput(err.body_text())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput(msg) => AppError::InvalidInput(msg),
            PipelineError::RateLimited {
                wait_seconds,
                reset_at,
            } => AppError::RateLimited {
                wait_seconds,
                reset_at,
            },
            e if e.is_provider() => AppError::Http {
                status: StatusCode::BAD_GATEWAY,
                code: "provider_error",
                message: e.to_string(),
            },
            e => AppError::Http {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal_server_error",
                message: e.to_string(),
            },
        }
    }
}
