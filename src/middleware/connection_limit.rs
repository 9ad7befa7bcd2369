//! Connection limit middleware for media-stream WebSockets
//!
//! Enforces `max_websocket_connections`. Each accepted upgrade carries a
//! [`StreamPermit`] extension that the handler keeps alive for the length of the
//! call; the slot frees itself when the permit drops.
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Middleware that enforces the media-stream connection limit.
///
/// Only WebSocket upgrade requests (detected by the Upgrade header) are counted.
/// Returns 503 Service Unavailable when the limit is reached.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    match state.try_acquire_connection() {
        Ok(permit) => {
            request.extensions_mut().insert(permit);
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                active = state.ws_connection_count(),
                "Rejecting media stream: connection limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
    }
}
