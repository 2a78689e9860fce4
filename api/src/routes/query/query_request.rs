use rag_pipeline::{Message, Query};
use serde::Deserialize;

/// Request payload for `/query`, `/query-selection` and `/query/sync`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Client-generated UUID, stable across a conversation.
    pub session_id: String,
    pub question: String,
    /// Text the reader highlighted on the page.
    #[serde(default)]
    pub selected_text: Option<String>,
    /// Prior turns, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<Message>,
}

impl QueryRequest {
    pub fn into_query(self) -> Query {
        let mut query = Query::new(self.session_id, self.question)
            .with_history(self.conversation_history);
        if let Some(sel) = self.selected_text {
            query = query.with_selection(sel);
        }
        query
    }

    pub fn has_selection(&self) -> bool {
        self.selected_text
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_pipeline::MessageRole;

    #[test]
    fn deserializes_minimal_and_full_payloads() {
        let min: QueryRequest = serde_json::from_value(serde_json::json!({
            "session_id": "3f2b8c1e-4d5a-4e6f-9a7b-1c2d3e4f5a6b",
            "question": "What is inverse kinematics?"
        }))
        .expect("minimal");
        assert!(!min.has_selection());
        let q = min.into_query();
        assert!(q.history.is_empty());
        assert!(q.validate().is_ok());

        let full: QueryRequest = serde_json::from_value(serde_json::json!({
            "session_id": "3f2b8c1e-4d5a-4e6f-9a7b-1c2d3e4f5a6b",
            "question": "Explain this in simpler terms",
            "selected_text": "Inverse kinematics (IK) is the process...",
            "conversation_history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }))
        .expect("full");
        assert!(full.has_selection());
        let q = full.into_query();
        assert_eq!(q.history[1].role, MessageRole::Assistant);
        assert!(q.selection().is_some());
    }

    #[test]
    fn whitespace_selection_does_not_count() {
        let req = QueryRequest {
            session_id: String::new(),
            question: "q".into(),
            selected_text: Some("   ".into()),
            conversation_history: Vec::new(),
        };
        assert!(!req.has_selection());
    }
}
