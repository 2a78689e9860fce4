//! Request, response and streaming event types.

use chrono::{DateTime, Utc};
use rag_store::StoredHit;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

pub const MAX_QUESTION_CHARS: usize = 2000;
pub const MAX_SELECTION_CHARS: usize = 5000;
pub const MAX_HISTORY_MESSAGES: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One prior turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Immutable request unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub selected_text: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl Query {
    pub fn new(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            question: question.into(),
            selected_text: None,
            timestamp: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn with_selection(mut self, selected: impl Into<String>) -> Self {
        self.selected_text = Some(selected.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Non-blank selection, if any.
    pub fn selection(&self) -> Option<&str> {
        self.selected_text
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Field checks done at ingress.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if Uuid::parse_str(&self.session_id).is_err() {
            return Err(PipelineError::InvalidInput(
                "session_id must be a valid UUID".into(),
            ));
        }
        if self.question.trim().is_empty() {
            return Err(PipelineError::InvalidInput("question must not be empty".into()));
        }
        if self.question.chars().count() > MAX_QUESTION_CHARS {
            return Err(PipelineError::InvalidInput(format!(
                "question exceeds {MAX_QUESTION_CHARS} characters"
            )));
        }
        if let Some(sel) = &self.selected_text {
            if sel.chars().count() > MAX_SELECTION_CHARS {
                return Err(PipelineError::InvalidInput(format!(
                    "selected_text exceeds {MAX_SELECTION_CHARS} characters"
                )));
            }
        }
        if self.history.len() > MAX_HISTORY_MESSAGES {
            return Err(PipelineError::InvalidInput(format!(
                "conversation history exceeds {MAX_HISTORY_MESSAGES} messages"
            )));
        }
        if self.history.iter().any(|m| m.content.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(
                "history messages must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A passage returned by retrieval. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub embedding_id: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
}

impl From<StoredHit> for RetrievedPassage {
    fn from(hit: StoredHit) -> Self {
        let p = hit.payload;
        Self {
            embedding_id: hit.id,
            text: p.text,
            score: hit.score,
            chapter: p.chapter,
            section: p.section,
            chapter_number: p.chapter_number,
            section_number: p.section_number,
            heading: p.heading,
            doc_url: p.doc_url,
        }
    }
}

/// A marker resolved against a retrieved passage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: Uuid,
    pub text: String,
    /// Always a `/docs/` path.
    pub url: String,
    pub chapter: String,
    /// 0 when the marker named no chapter.
    pub chapter_number: u32,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub section_number: Option<u32>,
    #[serde(default)]
    pub heading: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Completed,
    Failed,
}

/// Terminal artifact of one query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub query_id: Uuid,
    pub content: String,
    pub citations: Vec<Citation>,
    pub retrieved_passages: Vec<RetrievedPassage>,
    pub confidence_score: Option<f32>,
    pub generation_latency_ms: u64,
    pub status: ResponseStatus,
    pub timestamp: DateTime<Utc>,
}

/// Admission snapshot for one session. Derived, never stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RateLimitInfo {
    pub is_limited: bool,
    pub wait_seconds: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Events of a streamed answer, in emission order:
/// chunks, then citations, then exactly one `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Chunk { content: String },
    Citation(Citation),
    Done { query_id: Uuid, confidence_score: f32 },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}
