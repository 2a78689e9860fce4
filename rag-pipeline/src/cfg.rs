//! Runtime configuration loaded from environment variables.

use std::time::Duration;

/// Retrieval and generation knobs. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Passage budget per query (hybrid mode splits it in half).
    pub top_k: usize,
    /// Similarity floor; hits below it are never returned.
    pub min_score: f32,
    /// Expected embedding dimensionality (exact match).
    pub embedding_dim: usize,
    /// Selection text is embedded from this many leading chars.
    pub selection_prefix_chars: usize,
    /// Most recent history messages carried into the prompt.
    pub history_turns: usize,
    /// Deadline for each upstream call and each streamed chunk.
    pub upstream_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.7,
            embedding_dim: 1024,
            selection_prefix_chars: 500,
            history_turns: 10,
            upstream_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Build from environment variables with defaults.
    ///
    /// # Example
    /// ```
    /// # use rag_pipeline::PipelineConfig;
    /// let cfg = PipelineConfig::from_env();
    /// assert!(cfg.top_k >= 1);
    /// ```
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            top_k: parse("RAG_TOP_K", d.top_k).max(1),
            min_score: parse("RAG_MIN_SCORE", d.min_score).clamp(0.0, 1.0),
            embedding_dim: parse("EMBEDDING_DIM", d.embedding_dim),
            selection_prefix_chars: parse("RAG_SELECTION_PREFIX_CHARS", d.selection_prefix_chars),
            history_turns: parse("RAG_HISTORY_TURNS", d.history_turns),
            upstream_timeout: Duration::from_secs(parse("RAG_UPSTREAM_TIMEOUT_SECS", 60u64)),
        }
    }
}

/// Sliding-window limiter settings.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_queries: usize,
    pub window_seconds: u64,
    /// Sessions idle longer than this are dropped by the sweep.
    pub retention_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_queries: 10,
            window_seconds: 60,
            retention_seconds: 3600,
            sweep_interval_seconds: 3600,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_queries: parse("RATE_LIMIT_QUERIES", d.max_queries).max(1),
            window_seconds: parse("RATE_LIMIT_WINDOW_SECONDS", d.window_seconds).max(1),
            retention_seconds: parse("RATE_LIMIT_RETENTION_SECS", d.retention_seconds),
            sweep_interval_seconds: parse("RATE_LIMIT_SWEEP_INTERVAL_SECS", d.sweep_interval_seconds)
                .max(1),
        }
    }
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}
