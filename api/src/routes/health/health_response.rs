use ai_llm_service::health_service::HealthStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServicesHealth,
}

#[derive(Debug, Serialize)]
pub struct ServicesHealth {
    pub api: &'static str,
    pub rate_limiter: RateLimiterHealth,
    pub qdrant: QdrantHealth,
    pub llm: Vec<HealthStatus>,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterHealth {
    pub status: &'static str,
    pub tracked_sessions: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QdrantHealth {
    Healthy { collection: String, points_count: u64 },
    Unhealthy { error: String },
}

impl QdrantHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, QdrantHealth::Healthy { .. })
    }
}

/// `healthy` only when the store and every provider probe are up.
pub fn overall_status(qdrant: &QdrantHealth, llm: &[HealthStatus]) -> &'static str {
    if qdrant.is_healthy() && llm.iter().all(|s| s.ok) {
        "healthy"
    } else {
        "degraded"
    }
}
