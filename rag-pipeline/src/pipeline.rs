//! Pipeline controller: one admitted query from embedding to a final Response.
//!
//! `process` never fails once a query is admitted; upstream failures become a
//! `failed` Response. The streaming variant emits chunks, then citations, then
//! exactly one terminal event, and stops pulling upstream as soon as the
//! consumer goes away.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use rag_store::VectorStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cfg::PipelineConfig;
use crate::citations::extract_citations;
use crate::embedding::EmbeddingGateway;
use crate::error::PipelineError;
use crate::generation::GenerationOrchestrator;
use crate::models::{Citation, Query, Response, ResponseStatus, RetrievedPassage, StreamEvent};
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::rate_limiter::RateLimiter;
use crate::retrieval::RetrievalEngine;

pub const NOT_FOUND_MESSAGE: &str = "I couldn't find information about this in the textbook. \
Please try rephrasing your question or ask about a different topic.";

const RESPONSE_PASSAGES: usize = 5;
const RESPONSE_PASSAGE_CHARS: usize = 500;
const STREAM_BUFFER: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Embedding,
    Retrieving,
    Generating,
    Citing,
    Done,
    Failed,
}

/// How a stream ended without an upstream error.
enum StreamEnd {
    Completed,
    Disconnected,
}

pub struct RagPipeline {
    cfg: PipelineConfig,
    limiter: Arc<RateLimiter>,
    embeddings: Arc<EmbeddingGateway>,
    retrieval: RetrievalEngine,
    generation: GenerationOrchestrator,
}

impl RagPipeline {
    pub fn new(
        cfg: PipelineConfig,
        limiter: Arc<RateLimiter>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let embeddings = Arc::new(EmbeddingGateway::new(
            embedder,
            cfg.embedding_dim,
            cfg.upstream_timeout,
        ));
        let retrieval = RetrievalEngine::new(
            store,
            Arc::clone(&embeddings),
            cfg.upstream_timeout,
            cfg.selection_prefix_chars,
        );
        let generation =
            GenerationOrchestrator::new(generator, cfg.upstream_timeout, cfg.history_turns);
        Self {
            cfg,
            limiter,
            embeddings,
            retrieval,
            generation,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Validation then atomic check-and-record. Nothing upstream is touched.
    pub fn admit(&self, query: &Query) -> Result<(), PipelineError> {
        query.validate()?;
        self.limiter.check_and_record(&query.session_id)?;
        Ok(())
    }

    /// Admission followed by [`process`](Self::process).
    pub async fn ask(&self, query: &Query) -> Result<Response, PipelineError> {
        self.admit(query)?;
        Ok(self.process(query).await)
    }

    /// Admission, then the streamed lifecycle on a background task.
    ///
    /// Dropping the receiver cancels upstream generation.
    pub fn ask_stream(
        self: &Arc<Self>,
        query: Query,
    ) -> Result<mpsc::Receiver<StreamEvent>, PipelineError> {
        self.admit(&query)?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.stream_into(&query, tx).await });
        Ok(rx)
    }

    /// Full lifecycle for an admitted query, always producing a Response.
    pub async fn process(&self, query: &Query) -> Response {
        let started = Instant::now();
        let result = AssertUnwindSafe(self.answer(query))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(internal_from_panic(panic)));
        let latency_ms = elapsed_ms(started);

        match result {
            Ok(None) => {
                self.log_stage(query, Stage::Done);
                info!(query_id = %query.id, hits = 0, latency_ms, "no passages above threshold");
                Response {
                    id: Uuid::new_v4(),
                    query_id: query.id,
                    content: NOT_FOUND_MESSAGE.to_string(),
                    citations: Vec::new(),
                    retrieved_passages: Vec::new(),
                    confidence_score: Some(0.0),
                    generation_latency_ms: latency_ms,
                    status: ResponseStatus::Completed,
                    timestamp: Utc::now(),
                }
            }
            Ok(Some((content, citations, passages))) => {
                self.log_stage(query, Stage::Done);
                info!(
                    query_id = %query.id,
                    session_id = %query.session_id,
                    hits = passages.len(),
                    citations = citations.len(),
                    latency_ms,
                    "query answered"
                );
                Response {
                    id: Uuid::new_v4(),
                    query_id: query.id,
                    content,
                    citations,
                    confidence_score: Some(confidence(&passages)),
                    retrieved_passages: payload_passages(passages),
                    generation_latency_ms: latency_ms,
                    status: ResponseStatus::Completed,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                self.log_stage(query, Stage::Failed);
                warn!(query_id = %query.id, error = %e, latency_ms, "query failed");
                failed_response(query, &e, latency_ms)
            }
        }
    }

    /// Streams one admitted query into `tx`.
    ///
    /// A closed channel is a normal outcome: upstream is dropped and nothing
    /// further is sent.
    pub async fn stream_into(&self, query: &Query, tx: mpsc::Sender<StreamEvent>) {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.stream_stages(query, &tx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(internal_from_panic(panic)));
        match outcome {
            Ok(StreamEnd::Completed) => {
                self.log_stage(query, Stage::Done);
                info!(query_id = %query.id, latency_ms = elapsed_ms(started), "stream completed");
            }
            Ok(StreamEnd::Disconnected) => {
                debug!(query_id = %query.id, "consumer disconnected, stream abandoned");
            }
            Err(e) => {
                self.log_stage(query, Stage::Failed);
                warn!(query_id = %query.id, error = %e, "stream failed");
                let _ = tx
                    .send(StreamEvent::Error {
                        message: failure_message(&e),
                    })
                    .await;
            }
        }
    }

    /// `None` when retrieval is empty, else `(content, citations, passages)`.
    async fn answer(
        &self,
        query: &Query,
    ) -> Result<Option<(String, Vec<Citation>, Vec<RetrievedPassage>)>, PipelineError> {
        let passages = self.retrieve_for(query).await?;
        if passages.is_empty() {
            return Ok(None);
        }

        self.log_stage(query, Stage::Generating);
        let prompt = self.generation.build_prompt(query, &passages);
        let content = self.generation.generate(&prompt).await?;

        self.log_stage(query, Stage::Citing);
        let citations = extract_citations(&content, &passages);
        Ok(Some((content, citations, passages)))
    }

    async fn stream_stages(
        &self,
        query: &Query,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<StreamEnd, PipelineError> {
        let passages = self.retrieve_for(query).await?;
        if passages.is_empty() {
            let events = [
                StreamEvent::Chunk {
                    content: NOT_FOUND_MESSAGE.to_string(),
                },
                StreamEvent::Done {
                    query_id: query.id,
                    confidence_score: 0.0,
                },
            ];
            return Ok(send_all(tx, events).await);
        }

        self.log_stage(query, Stage::Generating);
        let prompt = self.generation.build_prompt(query, &passages);
        let mut upstream = self.generation.generate_stream(&prompt).await?;
        let mut full = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => return Ok(StreamEnd::Disconnected),
                next = upstream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            full.push_str(&chunk);
            if tx.send(StreamEvent::Chunk { content: chunk }).await.is_err() {
                return Ok(StreamEnd::Disconnected);
            }
        }
        drop(upstream);

        self.log_stage(query, Stage::Citing);
        let events = extract_citations(&full, &passages)
            .into_iter()
            .map(StreamEvent::Citation)
            .chain(std::iter::once(StreamEvent::Done {
                query_id: query.id,
                confidence_score: confidence(&passages),
            }));
        Ok(send_all(tx, events).await)
    }

    async fn retrieve_for(&self, query: &Query) -> Result<Vec<RetrievedPassage>, PipelineError> {
        self.log_stage(query, Stage::Embedding);
        let question_vector = self.embeddings.embed_for_query(&query.question).await?;

        self.log_stage(query, Stage::Retrieving);
        let passages = self
            .retrieval
            .retrieve(
                question_vector,
                query.selection(),
                self.cfg.top_k,
                self.cfg.min_score,
            )
            .await?;
        debug!(query_id = %query.id, hits = passages.len(), "retrieved");
        Ok(passages)
    }

    fn log_stage(&self, query: &Query, stage: Stage) {
        debug!(query_id = %query.id, ?stage, "stage");
    }
}

async fn send_all(
    tx: &mpsc::Sender<StreamEvent>,
    events: impl IntoIterator<Item = StreamEvent>,
) -> StreamEnd {
    for ev in events {
        if tx.send(ev).await.is_err() {
            return StreamEnd::Disconnected;
        }
    }
    StreamEnd::Completed
}

/// Mean passage score rounded to two decimals; 0.0 for no passages.
pub fn confidence(passages: &[RetrievedPassage]) -> f32 {
    if passages.is_empty() {
        return 0.0;
    }
    let mean = passages.iter().map(|p| f64::from(p.score)).sum::<f64>() / passages.len() as f64;
    ((mean * 100.0).round() / 100.0) as f32
}

fn payload_passages(passages: Vec<RetrievedPassage>) -> Vec<RetrievedPassage> {
    passages
        .into_iter()
        .take(RESPONSE_PASSAGES)
        .map(|mut p| {
            if p.text.chars().count() > RESPONSE_PASSAGE_CHARS {
                p.text = p.text.chars().take(RESPONSE_PASSAGE_CHARS).collect();
            }
            p
        })
        .collect()
}

fn failure_message(e: &PipelineError) -> String {
    format!("I encountered an error processing your question: {e}")
}

fn failed_response(query: &Query, e: &PipelineError, latency_ms: u64) -> Response {
    Response {
        id: Uuid::new_v4(),
        query_id: query.id,
        content: failure_message(e),
        citations: Vec::new(),
        retrieved_passages: Vec::new(),
        confidence_score: Some(0.0),
        generation_latency_ms: latency_ms,
        status: ResponseStatus::Failed,
        timestamp: Utc::now(),
    }
}

/// A collaborator panic surfaces as an unclassified failure.
fn internal_from_panic(panic: Box<dyn Any + Send>) -> PipelineError {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected panic".to_string());
    PipelineError::Internal(msg)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cfg::RateLimitConfig;
    use crate::test_support::{FakeEmbedder, FakeGenerator, FakeStore, passage};

    const SID: &str = "6a1f3c9e-2b7d-4e58-9c0a-5d4e3f2a1b0c";
    const DIM: usize = 3;

    fn cfg() -> PipelineConfig {
        PipelineConfig {
            embedding_dim: DIM,
            upstream_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        }
    }

    fn located(id: &str, score: f32, ch: u32, sec: u32) -> RetrievedPassage {
        RetrievedPassage {
            chapter_number: Some(ch),
            section_number: Some(sec),
            chapter: Some(format!("Chapter {ch}")),
            ..passage(id, score)
        }
    }

    fn pipeline_with(
        store: FakeStore,
        generator: Arc<FakeGenerator>,
        embedder: FakeEmbedder,
    ) -> Arc<RagPipeline> {
        Arc::new(RagPipeline::new(
            cfg(),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Arc::new(embedder),
            Arc::new(store),
            generator,
        ))
    }

    fn ik_store() -> FakeStore {
        FakeStore::new().hits(
            1.0,
            vec![
                located("p1", 0.91, 1, 4),
                located("p2", 0.85, 3, 2),
                located("p3", 0.72, 3, 5),
            ],
        )
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn inverse_kinematics_scenario() {
        let generator = Arc::new(FakeGenerator::reply("IK is... [Chapter 3, Section 2]."));
        let p = pipeline_with(ik_store(), generator, FakeEmbedder::new(DIM));
        let r = p
            .ask(&Query::new(SID, "What is inverse kinematics?"))
            .await
            .expect("admitted");

        assert_eq!(r.status, ResponseStatus::Completed);
        assert_eq!(r.confidence_score, Some(0.83));
        assert_eq!(r.citations.len(), 1);
        assert_eq!(r.citations[0].chapter_number, 3);
        assert_eq!(r.citations[0].section_number, Some(2));
        assert_eq!(r.citations[0].url, "/docs/chapter-3#section-2");
        assert_eq!(r.retrieved_passages.len(), 3);
    }

    #[tokio::test]
    async fn unmatched_chapter_cites_first_passage() {
        let generator = Arc::new(FakeGenerator::reply("Joints [Chapter 1]."));
        let store = FakeStore::new().hits(
            1.0,
            vec![located("first", 0.9, 2, 1), located("second", 0.8, 4, 4)],
        );
        let p = pipeline_with(store, generator, FakeEmbedder::new(DIM));
        let r = p.process(&Query::new(SID, "joints?")).await;
        assert_eq!(r.citations.len(), 1);
        assert_eq!(r.citations[0].chapter, "Chapter 2");
        assert_eq!(r.citations[0].chapter_number, 1);
    }

    #[tokio::test]
    async fn single_passage_confidence_is_its_score() {
        let store = FakeStore::new().hits(1.0, vec![passage("only", 0.83)]);
        let p = pipeline_with(store, Arc::new(FakeGenerator::reply("ok")), FakeEmbedder::new(DIM));
        let r = p.process(&Query::new(SID, "q")).await;
        assert_eq!(r.confidence_score, Some(0.83));
    }

    #[tokio::test]
    async fn empty_retrieval_short_circuits() {
        let generator = Arc::new(FakeGenerator::reply("unused"));
        let p = pipeline_with(FakeStore::new(), generator.clone(), FakeEmbedder::new(DIM));
        let r = p.process(&Query::new(SID, "anything")).await;
        assert_eq!(r.status, ResponseStatus::Completed);
        assert_eq!(r.content, NOT_FOUND_MESSAGE);
        assert_eq!(r.confidence_score, Some(0.0));
        assert!(r.citations.is_empty());
        assert!(r.retrieved_passages.is_empty());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_yields_failed_response() {
        let p = pipeline_with(ik_store(), Arc::new(FakeGenerator::failing()), FakeEmbedder::new(DIM));
        let r = p.process(&Query::new(SID, "q")).await;
        assert_eq!(r.status, ResponseStatus::Failed);
        assert!(!r.content.is_empty());
        assert!(r.content.starts_with("I encountered an error"));
        assert_eq!(r.confidence_score, Some(0.0));
        assert!(r.citations.is_empty());
        assert!(r.retrieved_passages.is_empty());
    }

    #[tokio::test]
    async fn provider_panic_yields_failed_response() {
        let p = pipeline_with(
            ik_store(),
            Arc::new(FakeGenerator::panicking()),
            FakeEmbedder::new(DIM),
        );
        let r = tokio::spawn(async move { p.process(&Query::new(SID, "q")).await })
            .await
            .expect("process must not unwind");
        assert_eq!(r.status, ResponseStatus::Failed);
        assert!(r.content.contains("internal error: provider bug"));
        assert_eq!(r.confidence_score, Some(0.0));
    }

    #[tokio::test]
    async fn provider_panic_mid_stream_sends_one_error_event() {
        let p = pipeline_with(
            ik_store(),
            Arc::new(FakeGenerator::panicking()),
            FakeEmbedder::new(DIM),
        );
        let events = drain(p.ask_stream(Query::new(SID, "q")).expect("admitted")).await;
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { message }) if message.contains("provider bug")
        ));
    }

    #[tokio::test]
    async fn embedding_failure_yields_failed_response() {
        let p = pipeline_with(
            ik_store(),
            Arc::new(FakeGenerator::reply("x")),
            FakeEmbedder::new(DIM).fail_on("q"),
        );
        let r = p.process(&Query::new(SID, "q")).await;
        assert_eq!(r.status, ResponseStatus::Failed);
    }

    #[tokio::test]
    async fn response_passages_are_truncated() {
        let long: Vec<_> = (0..7)
            .map(|i| RetrievedPassage {
                text: "x".repeat(800),
                ..passage(&format!("p{i}"), 0.9)
            })
            .collect();
        let p = Arc::new(RagPipeline::new(
            PipelineConfig { top_k: 7, ..cfg() },
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Arc::new(FakeEmbedder::new(DIM)),
            Arc::new(FakeStore::new().hits(1.0, long)),
            Arc::new(FakeGenerator::reply("ok")),
        ));
        let r = p.process(&Query::new(SID, "q")).await;
        assert_eq!(r.retrieved_passages.len(), 5);
        assert!(r.retrieved_passages.iter().all(|p| p.text.chars().count() == 500));
    }

    #[tokio::test]
    async fn invalid_query_is_rejected_before_admission() {
        let p = pipeline_with(ik_store(), Arc::new(FakeGenerator::reply("x")), FakeEmbedder::new(DIM));
        let err = p.ask(&Query::new("nope", "q")).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(p.limiter().session_count(), 0);
    }

    #[tokio::test]
    async fn eleventh_query_is_rate_limited() {
        let p = pipeline_with(ik_store(), Arc::new(FakeGenerator::reply("x")), FakeEmbedder::new(DIM));
        for _ in 0..10 {
            p.ask(&Query::new(SID, "q")).await.expect("admitted");
        }
        match p.ask(&Query::new(SID, "q")).await {
            Err(PipelineError::RateLimited { wait_seconds, .. }) => assert!(wait_seconds >= 1),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_orders_chunks_citations_done() {
        let generator = Arc::new(FakeGenerator::chunks(&["IK is", "... [Chapter 3, Section 2]."]));
        let p = pipeline_with(ik_store(), generator, FakeEmbedder::new(DIM));
        let q = Query::new(SID, "What is inverse kinematics?");
        let qid = q.id;
        let events = drain(p.ask_stream(q).expect("admitted")).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StreamEvent::Chunk { content } if content == "IK is"));
        assert!(matches!(&events[1], StreamEvent::Chunk { .. }));
        assert!(matches!(&events[2], StreamEvent::Citation(c) if c.section_number == Some(2)));
        assert_eq!(
            events[3],
            StreamEvent::Done {
                query_id: qid,
                confidence_score: 0.83
            }
        );
    }

    #[tokio::test]
    async fn stream_empty_retrieval_sends_apology_then_done() {
        let p = pipeline_with(FakeStore::new(), Arc::new(FakeGenerator::reply("x")), FakeEmbedder::new(DIM));
        let events = drain(p.ask_stream(Query::new(SID, "q")).expect("admitted")).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Chunk { content } if content == NOT_FOUND_MESSAGE));
        assert!(matches!(events[1], StreamEvent::Done { confidence_score, .. } if confidence_score == 0.0));
    }

    #[tokio::test]
    async fn stream_failure_ends_with_error_event() {
        let generator = Arc::new(FakeGenerator::chunks(&["partial"]).then_fail());
        let p = pipeline_with(ik_store(), generator, FakeEmbedder::new(DIM));
        let events = drain(p.ask_stream(Query::new(SID, "q")).expect("admitted")).await;
        assert!(matches!(events.first(), Some(StreamEvent::Chunk { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn consumer_disconnect_releases_upstream() {
        let generator = Arc::new(FakeGenerator::chunks(&["first"]).then_hang());
        let p = pipeline_with(ik_store(), generator.clone(), FakeEmbedder::new(DIM));
        let query = Query::new(SID, "q");
        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);

        let task = {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.stream_into(&query, tx).await })
        };
        assert!(matches!(rx.recv().await, Some(StreamEvent::Chunk { .. })));
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("task ends after disconnect")
            .expect("task did not panic");
        assert!(generator.released());
        assert_eq!(generator.pulls(), 1);
    }

    #[tokio::test]
    async fn selection_reaches_prompt_and_boosts_retrieval() {
        let generator = Arc::new(FakeGenerator::reply("ok"));
        let store = ik_store().hits(2.0, vec![located("sel", 0.88, 7, 1)]);
        let p = pipeline_with(
            store,
            generator.clone(),
            FakeEmbedder::new(DIM).tag("the Jacobian matrix", 2.0),
        );
        let r = p
            .process(&Query::new(SID, "Explain this").with_selection("the Jacobian matrix"))
            .await;
        assert_eq!(r.retrieved_passages[0].embedding_id, "sel");
        let prompts = generator.prompts();
        let user = &prompts[0].last().expect("user turn").content;
        assert!(user.contains("\"the Jacobian matrix\""));
    }

    #[test]
    fn confidence_rounds_mean() {
        let ps = [passage("a", 0.91), passage("b", 0.85), passage("c", 0.72)];
        assert_eq!(confidence(&ps), 0.83);
        assert_eq!(confidence(&[]), 0.0);
    }
}
