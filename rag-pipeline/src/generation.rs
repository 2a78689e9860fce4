//! Generation orchestrator: prompt building plus complete or streamed calls.

use std::sync::Arc;
use std::time::Duration;

use ai_llm_service::services::TextStream;
use ai_llm_service::types::ChatMessage;
use futures::StreamExt;
use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::models::{Query, RetrievedPassage};
use crate::prompt;
use crate::providers::GenerationProvider;

pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
    history_turns: usize,
}

impl GenerationOrchestrator {
    pub fn new(provider: Arc<dyn GenerationProvider>, timeout: Duration, history_turns: usize) -> Self {
        Self {
            provider,
            timeout,
            history_turns,
        }
    }

    pub fn build_prompt(&self, query: &Query, passages: &[RetrievedPassage]) -> Vec<ChatMessage> {
        prompt::build_prompt(
            &query.question,
            query.selection(),
            passages,
            &query.history,
            self.history_turns,
        )
    }

    /// Single complete call.
    #[instrument(level = "debug", skip_all, fields(turns = prompt.len()))]
    pub async fn generate(&self, prompt: &[ChatMessage]) -> Result<String, PipelineError> {
        let text = tokio::time::timeout(self.timeout, self.provider.complete(prompt))
            .await
            .map_err(|_| timed_out(self.timeout))?
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        debug!(chars = text.len(), "generation complete");
        Ok(text)
    }

    /// Opens an upstream stream. Dropping the returned value closes it.
    #[instrument(level = "debug", skip_all, fields(turns = prompt.len()))]
    pub async fn generate_stream(&self, prompt: &[ChatMessage]) -> Result<GenerationStream, PipelineError> {
        let inner = tokio::time::timeout(self.timeout, self.provider.stream(prompt))
            .await
            .map_err(|_| timed_out(self.timeout))?
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        Ok(GenerationStream {
            inner,
            timeout: self.timeout,
        })
    }
}

/// Ordered, single-pass sequence of text fragments.
///
/// Each pull is bounded by the upstream timeout. Empty fragments are skipped.
pub struct GenerationStream {
    inner: TextStream,
    timeout: Duration,
}

impl GenerationStream {
    pub async fn next(&mut self) -> Option<Result<String, PipelineError>> {
        loop {
            let item = match tokio::time::timeout(self.timeout, self.inner.next()).await {
                Ok(item) => item?,
                Err(_) => return Some(Err(timed_out(self.timeout))),
            };
            match item {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => return Some(Ok(chunk)),
                Err(e) => return Some(Err(PipelineError::Generation(e.to_string()))),
            }
        }
    }

    /// Drains the rest of the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, PipelineError> {
        let mut out = String::new();
        while let Some(chunk) = self.next().await {
            out.push_str(&chunk?);
        }
        Ok(out)
    }
}

fn timed_out(after: Duration) -> PipelineError {
    PipelineError::Generation(format!("timed out after {after:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGenerator;

    fn orchestrator(fake: FakeGenerator, timeout: Duration) -> GenerationOrchestrator {
        GenerationOrchestrator::new(Arc::new(fake), timeout, 10)
    }

    #[tokio::test]
    async fn generate_returns_provider_text() {
        let g = orchestrator(FakeGenerator::reply("IK is..."), Duration::from_secs(5));
        let text = g.generate(&[ChatMessage::user("q")]).await.expect("text");
        assert_eq!(text, "IK is...");
    }

    #[tokio::test]
    async fn generate_maps_provider_failure() {
        let g = orchestrator(FakeGenerator::failing(), Duration::from_secs(5));
        let err = g.generate(&[ChatMessage::user("q")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn stream_yields_fragments_in_order() {
        let g = orchestrator(
            FakeGenerator::chunks(&["IK ", "", "is", "..."]),
            Duration::from_secs(5),
        );
        let mut s = g.generate_stream(&[ChatMessage::user("q")]).await.expect("stream");
        let mut got = Vec::new();
        while let Some(c) = s.next().await {
            got.push(c.expect("chunk"));
        }
        assert_eq!(got, ["IK ", "is", "..."]);
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let g = orchestrator(
            FakeGenerator::chunks(&["partial"]).then_hang(),
            Duration::from_millis(20),
        );
        let mut s = g.generate_stream(&[ChatMessage::user("q")]).await.expect("stream");
        assert_eq!(s.next().await.expect("first").expect("ok"), "partial");
        assert!(matches!(s.next().await, Some(Err(PipelineError::Generation(_)))));
    }

    #[tokio::test]
    async fn collect_text_concatenates() {
        let g = orchestrator(FakeGenerator::chunks(&["a", "b", "c"]), Duration::from_secs(5));
        let s = g.generate_stream(&[ChatMessage::user("q")]).await.expect("stream");
        assert_eq!(s.collect_text().await.expect("text"), "abc");
    }
}
