//! Grounding prompt assembly.

use ai_llm_service::types::ChatMessage;

use crate::models::{Message, MessageRole, RetrievedPassage};

pub const SYSTEM_PROMPT: &str = r#"You are an AI assistant for the "AI/Spec-Driven Physical AI & Humanoid Robotics" textbook.
Your role is to answer questions using ONLY the provided context from the textbook.

IMPORTANT RULES:
1. Only use information from the provided context passages
2. If the context doesn't contain the answer, say "I couldn't find information about this in the textbook"
3. Include citations in the format [Chapter X, Section Y] for all claims
4. Be concise but accurate
5. If the user selected text, prioritize that context
6. Do not make up or infer information not in the context"#;

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// System turn, the newest `history_turns` history messages, then one user turn.
pub fn build_prompt(
    question: &str,
    selection: Option<&str>,
    passages: &[RetrievedPassage],
    history: &[Message],
    history_turns: usize,
) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(history_turns);
    let mut messages = Vec::with_capacity(2 + history.len() - skip);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history[skip..].iter().map(|m| match m.role {
        MessageRole::User => ChatMessage::user(m.content.as_str()),
        MessageRole::Assistant => ChatMessage::assistant(m.content.as_str()),
    }));

    let context = render_context(passages);
    let user = match selection {
        Some(sel) => format!(
            "SELECTED TEXT FROM TEXTBOOK:\n\"{sel}\"\n\n\
             RETRIEVED CONTEXT:\n{context}\n\n\
             QUESTION: {question}\n\n\
             Please answer the question focusing on the selected text above, \
             using the retrieved context for additional information."
        ),
        None => format!(
            "RETRIEVED CONTEXT:\n{context}\n\n\
             QUESTION: {question}\n\n\
             Please answer the question using only the context provided above."
        ),
    };
    messages.push(ChatMessage::user(user));
    messages
}

fn render_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| {
            format!(
                "**{} - {}**\n{}",
                p.chapter.as_deref().unwrap_or("Unknown"),
                p.section.as_deref().unwrap_or("Unknown"),
                p.text
            )
        })
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}
