//! Core data models used by the library.

use serde::{Deserialize, Serialize};

/// Metadata stored with every textbook passage.
///
/// Field names match the payload keys written by the corpus indexer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PassagePayload {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
}

/// A single search hit: point id, similarity score and decoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredHit {
    pub id: String,
    pub score: f32,
    pub payload: PassagePayload,
}

/// Exact-match conditions; all must hold.
#[derive(Clone, Debug, Default)]
pub struct RagFilter {
    /// Exact match on a field, e.g. `("chapter_number", 3)`.
    pub equals: Vec<(String, serde_json::Value)>,
}

impl RagFilter {
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }
}

/// Collection snapshot for health reporting.
#[derive(Clone, Debug, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub points_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tolerates_missing_fields() {
        let p: PassagePayload = serde_json::from_value(serde_json::json!({
            "text": "Servos close the loop.",
            "chapter_number": 2
        }))
        .expect("payload");
        assert_eq!(p.chapter_number, Some(2));
        assert_eq!(p.section_number, None);
        assert!(p.doc_url.is_none());
    }

    #[test]
    fn payload_omits_absent_optionals_when_serialized() {
        let p = PassagePayload {
            text: "t".into(),
            chapter_number: Some(1),
            ..Default::default()
        };
        let v = serde_json::to_value(&p).expect("json");
        assert_eq!(v, serde_json::json!({"text": "t", "chapter_number": 1}));
    }
}
