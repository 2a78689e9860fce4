//! POST /query, /query-selection (SSE) and /query/sync (JSON).

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use rag_pipeline::Response;
use tracing::debug;

use crate::{
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
    routes::query::{query_request::QueryRequest, sse_stream::sse_response},
};

/// Handler: POST /query
///
/// # Example
/// ```bash
/// curl -N -X POST http://127.0.0.1:8000/query \
///   -H 'content-type: application/json' \
///   -d '{"session_id":"3f2b8c1e-4d5a-4e6f-9a7b-1c2d3e4f5a6b","question":"What is inverse kinematics?"}'
/// ```
pub async fn query_route(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = body?;
    let query = req.into_query();
    debug!(query_id = %query.id, session_id = %query.session_id, "query: start");
    let rx = state.pipeline.ask_stream(query)?;
    Ok(sse_response(rx))
}

/// Handler: POST /query-selection
///
/// Same stream as `/query`; a non-blank `selected_text` is required.
pub async fn query_selection_route(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = body?;
    if !req.has_selection() {
        return Err(AppError::InvalidInput(
            "selected_text is required for this endpoint".into(),
        ));
    }
    let query = req.into_query();
    debug!(query_id = %query.id, session_id = %query.session_id, "query-selection: start");
    let rx = state.pipeline.ask_stream(query)?;
    Ok(sse_response(rx))
}

/// Handler: POST /query/sync
///
/// Whole answer as one JSON `Response`; pipeline failures arrive with
/// `status = "failed"` and HTTP 200.
pub async fn query_sync_route(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<Json<Response>> {
    let Json(req) = body?;
    let query = req.into_query();
    let response = state.pipeline.ask(&query).await?;
    Ok(Json(response))
}
