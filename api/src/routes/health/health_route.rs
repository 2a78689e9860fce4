//! GET /health: store and provider probes.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::warn;

use crate::{
    core::app_state::AppState,
    routes::health::health_response::{
        HealthResponse, QdrantHealth, RateLimiterHealth, ServicesHealth, overall_status,
    },
};

/// Handler: GET /health
///
/// Always 200; dependency trouble shows up as `status = "degraded"`.
pub async fn health_route(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (stats, llm) = tokio::join!(state.store.stats(), state.llm.health_all());

    let qdrant = match stats {
        Ok(s) => QdrantHealth::Healthy {
            collection: s.collection,
            points_count: s.points_count,
        },
        Err(e) => {
            warn!(error = %e, "health: qdrant probe failed");
            QdrantHealth::Unhealthy {
                error: e.to_string(),
            }
        }
    };

    Json(HealthResponse {
        status: overall_status(&qdrant, &llm),
        timestamp: Utc::now(),
        services: ServicesHealth {
            api: "healthy",
            rate_limiter: RateLimiterHealth {
                status: "healthy",
                tracked_sessions: state.pipeline.limiter().session_count(),
            },
            qdrant,
            llm,
        },
    })
}
