use futures::stream::BoxStream;

use crate::error_handler::AiLlmError;

pub mod cohere_service;
pub mod line_stream;
pub mod ollama_service;
pub mod open_ai_service;

/// Ordered, single-pass stream of generated text fragments.
pub type TextStream = BoxStream<'static, Result<String, AiLlmError>>;
