//! In-memory collaborators for unit tests.
//!
//! Vectors are "tagged": a text embeds to `vec![tag; dim]` and the store keys
//! its canned hits by the first component of the query vector.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ai_llm_service::error_handler::{AiLlmError, Provider, ProviderError, ProviderErrorKind};
use ai_llm_service::services::TextStream;
use ai_llm_service::types::{ChatMessage, EmbedMode};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rag_store::{CollectionStats, PassagePayload, RagError, RagFilter, StoredHit, VectorStore};

use crate::models::RetrievedPassage;
use crate::providers::{EmbeddingProvider, GenerationProvider};

pub fn passage(id: &str, score: f32) -> RetrievedPassage {
    RetrievedPassage {
        embedding_id: id.to_string(),
        text: format!("passage {id}"),
        score,
        chapter: None,
        section: None,
        chapter_number: None,
        section_number: None,
        heading: None,
        doc_url: None,
    }
}

fn upstream_error(what: &str) -> AiLlmError {
    ProviderError::new(Provider::OpenAI, ProviderErrorKind::Decode(what.to_string())).into()
}

#[derive(Default)]
pub struct FakeEmbedder {
    dim: usize,
    tags: HashMap<String, f32>,
    fail_on: HashSet<String>,
    per_text: Option<usize>,
    modes: Mutex<Vec<EmbedMode>>,
}

impl FakeEmbedder {
    /// Untagged texts embed to `vec![1.0; dim]`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    pub fn tag(mut self, text: &str, value: f32) -> Self {
        self.tags.insert(text.to_string(), value);
        self
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_string());
        self
    }

    /// Returns `n` vectors for every input text instead of one.
    pub fn vectors_per_text(mut self, n: usize) -> Self {
        self.per_text = Some(n);
        self
    }

    pub fn modes(&self) -> Vec<EmbedMode> {
        self.modes.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>, AiLlmError> {
        if let Ok(mut m) = self.modes.lock() {
            m.push(mode);
        }
        let per_text = self.per_text.unwrap_or(1);
        let mut out = Vec::with_capacity(texts.len() * per_text);
        for t in texts {
            if self.fail_on.contains(t) {
                return Err(upstream_error("embedding refused"));
            }
            let tag = self.tags.get(t).copied().unwrap_or(1.0);
            out.extend(std::iter::repeat_n(vec![tag; self.dim], per_text));
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeStore {
    hits: HashMap<u32, Vec<StoredHit>>,
    failing: HashSet<u32>,
    limits: Mutex<Vec<u64>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned hits for query vectors whose first component equals `tag`.
    pub fn hits(mut self, tag: f32, passages: Vec<RetrievedPassage>) -> Self {
        let hits = passages
            .into_iter()
            .map(|p| StoredHit {
                id: p.embedding_id,
                score: p.score,
                payload: PassagePayload {
                    text: p.text,
                    chapter: p.chapter,
                    chapter_number: p.chapter_number,
                    section: p.section,
                    section_number: p.section_number,
                    heading: p.heading,
                    doc_url: p.doc_url,
                },
            })
            .collect();
        self.hits.insert(tag.to_bits(), hits);
        self
    }

    pub fn fail_for(mut self, tag: f32) -> Self {
        self.failing.insert(tag.to_bits());
        self
    }

    /// Search limits in call order.
    pub fn limits(&self) -> Vec<u64> {
        self.limits.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn ensure_collection(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn upsert(&self, _id: &str, _vector: Vec<f32>, _payload: &PassagePayload) -> Result<(), RagError> {
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
        _filter: Option<&RagFilter>,
    ) -> Result<Vec<StoredHit>, RagError> {
        if let Ok(mut l) = self.limits.lock() {
            l.push(limit);
        }
        let key = vector.first().copied().unwrap_or_default().to_bits();
        if self.failing.contains(&key) {
            return Err(RagError::Qdrant("connection refused".into()));
        }
        let mut out: Vec<StoredHit> = self
            .hits
            .get(&key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|h| h.score >= score_threshold)
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn stats(&self) -> Result<CollectionStats, RagError> {
        Ok(CollectionStats {
            collection: "fake".into(),
            points_count: self.hits.values().map(Vec::len).sum::<usize>() as u64,
        })
    }
}

enum Script {
    Reply(String),
    Fail,
    Chunks(Vec<String>),
    Panic,
}

#[derive(Clone, Copy)]
enum Tail {
    End,
    Hang,
    Fail,
}

/// Sets its flag when dropped, i.e. when the upstream stream is released.
struct ReleaseFlag(Arc<AtomicBool>);

impl ReleaseFlag {
    fn hold(&self) {}
}

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct FakeGenerator {
    script: Script,
    tail: Tail,
    released: Arc<AtomicBool>,
    pulls: Arc<AtomicUsize>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeGenerator {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            tail: Tail::End,
            released: Arc::new(AtomicBool::new(false)),
            pulls: Arc::new(AtomicUsize::new(0)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::scripted(Script::Reply(text.to_string()))
    }

    pub fn failing() -> Self {
        Self::scripted(Script::Fail)
    }

    /// Panics in `complete` and on the first pull of a stream.
    pub fn panicking() -> Self {
        Self::scripted(Script::Panic)
    }

    pub fn chunks(parts: &[&str]) -> Self {
        Self::scripted(Script::Chunks(parts.iter().map(|s| s.to_string()).collect()))
    }

    /// After the scripted chunks, never yield again.
    pub fn then_hang(mut self) -> Self {
        self.tail = Tail::Hang;
        self
    }

    /// After the scripted chunks, yield an upstream error.
    pub fn then_fail(mut self) -> Self {
        self.tail = Tail::Fail;
        self
    }

    /// True once a stream handed out by this fake has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Items pulled from the upstream stream so far.
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn remember(&self, messages: &[ChatMessage]) {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(messages.to_vec());
        }
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiLlmError> {
        self.remember(messages);
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Chunks(parts) => Ok(parts.concat()),
            Script::Fail => Err(upstream_error("generation refused")),
            Script::Panic => panic!("provider bug"),
        }
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, AiLlmError> {
        self.remember(messages);
        let parts = match &self.script {
            Script::Reply(text) => vec![text.clone()],
            Script::Chunks(parts) => parts.clone(),
            Script::Fail => return Err(upstream_error("generation refused")),
            Script::Panic => {
                return Ok(stream::iter([()])
                    .map(|()| -> Result<String, AiLlmError> { panic!("provider bug") })
                    .boxed());
            }
        };
        let tail: BoxStream<'static, Result<String, AiLlmError>> = match self.tail {
            Tail::End => stream::empty().boxed(),
            Tail::Hang => stream::pending().boxed(),
            Tail::Fail => stream::once(async { Err(upstream_error("stream reset")) }).boxed(),
        };
        let flag = ReleaseFlag(Arc::clone(&self.released));
        let pulls = Arc::clone(&self.pulls);
        Ok(stream::iter(parts.into_iter().map(Ok))
            .chain(tail)
            .map(move |item| {
                flag.hold();
                pulls.fetch_add(1, Ordering::SeqCst);
                item
            })
            .boxed())
    }
}
