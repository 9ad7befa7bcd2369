use axum::{Json, response::IntoResponse};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check handler
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "OK" })
}
