use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub health: &'static str,
}

/// Handler: GET /
pub async fn root_route() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Textbook RAG API",
        version: env!("CARGO_PKG_VERSION"),
        health: "/health",
    })
}
