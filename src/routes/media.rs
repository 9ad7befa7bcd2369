//! Media-stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::core::telephony::MEDIA_STREAM_PATH;
use crate::handlers::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade opened by the telephony provider
///
/// # Protocol
///
/// The provider sends JSON text frames (`connected`, `start`, `media`, `mark`,
/// `stop`) carrying base64 G.711 u-law audio. The bridge answers with `media`,
/// `mark` and `clear` frames tagged with the stream's `streamSid`.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
