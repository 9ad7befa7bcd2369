use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, call_setup};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// - `GET /` health check
/// - `GET|POST /incoming-call` call-setup markup for the telephony provider
/// - `POST /outbound-call` place a call, optionally with a new agent briefing
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route(
            call_setup::INCOMING_CALL_PATH,
            get(call_setup::incoming_call).post(call_setup::incoming_call),
        )
        .route("/outbound-call", post(call_setup::outbound_call))
        .layer(TraceLayer::new_for_http())
}
