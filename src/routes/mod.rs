pub mod api;
pub mod media;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Combine the HTTP API and the media-stream routes.
///
/// The media-stream route carries the connection-limit middleware. Transport
/// layers (CORS, rate limiting, security headers) are added by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    let media_routes = media::create_media_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    api::create_api_router()
        .merge(media_routes)
        .with_state(state)
}
