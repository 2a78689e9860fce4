use std::{env, sync::Arc};

mod core;
mod error_handler;
mod routes;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub use crate::core::app_state::AppState;
pub use crate::error_handler::{AppError, AppResult};
use crate::routes::{
    health::health_route::health_route,
    query::query_route::{query_route, query_selection_route, query_sync_route},
    root_route::root_route,
};

const DEFAULT_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3001";

pub async fn start() -> AppResult<()> {
    let host_url = env::var("API_ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.into());
    let origins = env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.into());

    let state = Arc::new(AppState::from_env()?);

    // Startup must survive an unreachable store; /health reports it.
    match state.store.ensure_collection().await {
        Ok(()) => info!("qdrant collection ready"),
        Err(e) => warn!(error = %e, "qdrant initialization failed"),
    }
    let sweeper = state.pipeline.limiter().spawn_sweeper();

    let app = build_router(state, &origins);

    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %host_url, "listening");

    // Start server with graceful shutdown on Ctrl+C
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server);
    sweeper.abort();
    info!("server stopped");
    served
}

pub fn build_router(state: Arc<AppState>, cors_origins: &str) -> Router {
    Router::new()
        .route("/", get(root_route))
        .route("/health", get(health_route))
        .route("/query", post(query_route))
        .route("/query-selection", post(query_selection_route))
        .route("/query/sync", post(query_sync_route))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
