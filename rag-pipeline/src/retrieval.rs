//! Retrieval engine: thresholded vector search plus selection-boosted hybrid mode.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rag_store::{RagError, VectorStore};
use tracing::{debug, instrument, warn};

use crate::embedding::EmbeddingGateway;
use crate::error::PipelineError;
use crate::models::RetrievedPassage;

pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingGateway>,
    timeout: Duration,
    selection_prefix_chars: usize,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingGateway>,
        timeout: Duration,
        selection_prefix_chars: usize,
    ) -> Self {
        Self {
            store,
            embeddings,
            timeout,
            selection_prefix_chars,
        }
    }

    /// Passages with `score >= min_score`, best first, at most `top_k`.
    #[instrument(level = "debug", skip(self, vector))]
    pub async fn search(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievedPassage>, PipelineError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let hits = tokio::time::timeout(
            self.timeout,
            self.store.search(vector, top_k as u64, min_score, None),
        )
        .await
        .map_err(|_| RagError::Qdrant(format!("search timed out after {:?}", self.timeout)))??;

        let mut passages: Vec<RetrievedPassage> = hits
            .into_iter()
            .filter(|h| h.score >= min_score)
            .map(RetrievedPassage::from)
            .collect();
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        passages.truncate(top_k);
        debug!(hits = passages.len(), "search done");
        Ok(passages)
    }

    /// Question search, boosted by the selection when one is present.
    ///
    /// The boosted path spends `top_k / 2` on each vector and merges with the
    /// selection first. Any failure on the selection side falls back to a
    /// question-only search at the full budget.
    pub async fn retrieve(
        &self,
        question_vector: Vec<f32>,
        selection: Option<&str>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievedPassage>, PipelineError> {
        let half = top_k / 2;
        let selection = selection.filter(|s| !s.trim().is_empty());

        match selection {
            Some(sel) if half > 0 => {
                match self.selection_search(sel, half, min_score).await {
                    Ok(from_selection) => {
                        let from_question =
                            self.search(question_vector, half, min_score).await?;
                        debug!(
                            selection_hits = from_selection.len(),
                            question_hits = from_question.len(),
                            "hybrid search"
                        );
                        Ok(merge_hybrid(from_selection, from_question, top_k))
                    }
                    Err(e) => {
                        warn!(error = %e, "selection boost failed, using question-only search");
                        self.search(question_vector, top_k, min_score).await
                    }
                }
            }
            _ => self.search(question_vector, top_k, min_score).await,
        }
    }

    async fn selection_search(
        &self,
        selection: &str,
        budget: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievedPassage>, PipelineError> {
        let prefix: String = selection.chars().take(self.selection_prefix_chars).collect();
        let vector = self.embeddings.embed_for_query(&prefix).await?;
        self.search(vector, budget, min_score).await
    }
}

/// Selection hits first, then unseen question hits, capped at `top_k`.
pub fn merge_hybrid(
    selection: Vec<RetrievedPassage>,
    question: Vec<RetrievedPassage>,
    top_k: usize,
) -> Vec<RetrievedPassage> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(top_k);
    for p in selection.into_iter().chain(question) {
        if merged.len() >= top_k {
            break;
        }
        if seen.insert(p.embedding_id.clone()) {
            merged.push(p);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeEmbedder, FakeStore, passage};

    const DIM: usize = 2;

    fn engine(embedder: FakeEmbedder, store: Arc<FakeStore>) -> RetrievalEngine {
        let gateway = EmbeddingGateway::new(Arc::new(embedder), DIM, Duration::from_secs(5));
        RetrievalEngine::new(store, Arc::new(gateway), Duration::from_secs(5), 500)
    }

    #[test]
    fn merge_puts_selection_first_and_dedups() {
        let sel = vec![passage("a", 0.80), passage("b", 0.75)];
        let q = vec![passage("b", 0.95), passage("c", 0.90)];
        let merged = merge_hybrid(sel, q, 5);
        let ids: Vec<_> = merged.iter().map(|p| p.embedding_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(merged[1].score, 0.75);
    }

    #[test]
    fn merge_respects_cap() {
        let sel = vec![passage("a", 0.9), passage("b", 0.8)];
        let q = vec![passage("c", 0.9), passage("d", 0.8)];
        assert_eq!(merge_hybrid(sel, q, 3).len(), 3);
    }

    #[test]
    fn merge_never_yields_duplicate_ids() {
        let sel = vec![passage("a", 0.9), passage("a", 0.8), passage("b", 0.8)];
        let q = vec![passage("b", 0.9), passage("a", 0.7)];
        let merged = merge_hybrid(sel, q, 10);
        let ids: HashSet<_> = merged.iter().map(|p| p.embedding_id.clone()).collect();
        assert_eq!(ids.len(), merged.len());
    }

    #[tokio::test]
    async fn search_filters_sorts_and_truncates() {
        let store = Arc::new(FakeStore::new().hits(
            1.0,
            vec![passage("low", 0.5), passage("mid", 0.8), passage("top", 0.9)],
        ));
        let e = engine(FakeEmbedder::new(DIM), store);
        let got = e.search(vec![1.0; DIM], 1, 0.7).await.expect("search");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].embedding_id, "top");
    }

    #[tokio::test]
    async fn search_with_zero_budget_skips_store() {
        let store = Arc::new(FakeStore::new());
        let e = engine(FakeEmbedder::new(DIM), store.clone());
        assert!(e.search(vec![1.0; DIM], 0, 0.7).await.expect("ok").is_empty());
        assert!(store.limits().is_empty());
    }

    #[tokio::test]
    async fn hybrid_splits_budget_and_prefers_selection() {
        let store = Arc::new(
            FakeStore::new()
                .hits(1.0, vec![passage("q1", 0.95), passage("s1", 0.9)])
                .hits(2.0, vec![passage("s1", 0.85), passage("s2", 0.8)]),
        );
        let e = engine(FakeEmbedder::new(DIM).tag("selected words", 2.0), store.clone());
        let got = e
            .retrieve(vec![1.0; DIM], Some("selected words"), 4, 0.7)
            .await
            .expect("hybrid");
        let ids: Vec<_> = got.iter().map(|p| p.embedding_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2", "q1"]);
        assert_eq!(store.limits(), vec![2, 2]);
    }

    #[tokio::test]
    async fn selection_embedding_failure_falls_back_to_full_budget() {
        let store = Arc::new(FakeStore::new().hits(1.0, vec![passage("q1", 0.9)]));
        let e = engine(FakeEmbedder::new(DIM).fail_on("bad selection"), store.clone());
        let got = e
            .retrieve(vec![1.0; DIM], Some("bad selection"), 4, 0.7)
            .await
            .expect("fallback");
        assert_eq!(got.len(), 1);
        assert_eq!(store.limits(), vec![4]);
    }

    #[tokio::test]
    async fn selection_search_failure_falls_back() {
        let store = Arc::new(FakeStore::new().hits(1.0, vec![passage("q1", 0.9)]).fail_for(2.0));
        let e = engine(FakeEmbedder::new(DIM).tag("sel", 2.0), store.clone());
        let got = e
            .retrieve(vec![1.0; DIM], Some("sel"), 6, 0.7)
            .await
            .expect("fallback");
        assert_eq!(got[0].embedding_id, "q1");
        assert_eq!(store.limits(), vec![3, 6]);
    }

    #[tokio::test]
    async fn top_k_of_one_disables_boosting() {
        let store = Arc::new(FakeStore::new().hits(1.0, vec![passage("q1", 0.9)]));
        let e = engine(FakeEmbedder::new(DIM).tag("sel", 2.0), store.clone());
        let got = e.retrieve(vec![1.0; DIM], Some("sel"), 1, 0.7).await.expect("ok");
        assert_eq!(got.len(), 1);
        assert_eq!(store.limits(), vec![1]);
    }

    #[tokio::test]
    async fn question_search_failure_propagates() {
        let store = Arc::new(FakeStore::new().fail_for(1.0));
        let e = engine(FakeEmbedder::new(DIM), store);
        let err = e.retrieve(vec![1.0; DIM], None, 5, 0.7).await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
    }
}
