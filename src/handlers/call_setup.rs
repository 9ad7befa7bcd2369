//! Call-setup endpoints
//!
//! - `/incoming-call` answers the telephony provider's webhook with markup that
//!   connects the call audio to `/media-stream`.
//! - `/outbound-call` dials a number; the provider then fetches `/incoming-call`
//!   for the new call, so both directions end up on the same media path.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::telephony::{MEDIA_STREAM_PATH, connect_stream_twiml};
use crate::errors::{AppError, AppResult};
use crate::state::{AppState, MAX_INSTRUCTIONS_SIZE};
use crate::utils::{http_url, validate_phone_number, websocket_url};

/// Path the provider fetches call-setup markup from
pub const INCOMING_CALL_PATH: &str = "/incoming-call";

/// Outbound call request
#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    /// Destination number (E.164)
    pub to: String,
    /// New agent briefing for this and later calls
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Outbound call response
#[derive(Debug, Serialize)]
pub struct OutboundCallResponse {
    pub status: String,
    pub call_sid: String,
    pub to: String,
}

/// Externally reachable base URL: configured `PUBLIC_URL`, else the request host.
fn public_base_url(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
    if let Some(url) = &state.config.public_url {
        return Ok(url.clone());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Missing Host header and no PUBLIC_URL configured".to_string())
        })?;

    Ok(format!("https://{host}"))
}

/// Return markup that connects the call to the media-stream endpoint.
pub async fn incoming_call(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let stream_url = match public_base_url(&state, &headers).and_then(|base| {
        websocket_url(&base, MEDIA_STREAM_PATH)
            .map_err(|e| AppError::BadRequest(format!("Cannot build media stream URL: {e}")))
    }) {
        Ok(url) => url,
        Err(e) => return e.into_response(),
    };

    info!(stream_url = %stream_url, "Answering incoming call");

    let twiml = connect_stream_twiml(&stream_url, state.config.call_greeting.as_deref());
    ([(header::CONTENT_TYPE, "application/xml")], twiml).into_response()
}

/// Place an outbound call, optionally replacing the agent briefing.
///
/// The briefing is only replaced once the provider accepts the call. It then
/// applies to every call whose media stream starts afterwards; calls already in
/// progress keep the briefing they started with.
pub async fn outbound_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OutboundCallRequest>,
) -> AppResult<Json<OutboundCallResponse>> {
    let to = validate_phone_number(&request.to).map_err(AppError::BadRequest)?;

    let instructions = match request.instructions {
        Some(text) if text.trim().is_empty() => {
            return Err(AppError::BadRequest(
                "instructions must not be empty".to_string(),
            ));
        }
        Some(text) if text.len() > MAX_INSTRUCTIONS_SIZE => {
            return Err(AppError::BadRequest(format!(
                "instructions exceed maximum size of {MAX_INSTRUCTIONS_SIZE} bytes"
            )));
        }
        other => other,
    };

    let Some(twilio) = state.twilio.as_ref() else {
        return Err(AppError::NotConfigured(
            "Outbound calling is not configured (set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER)"
                .to_string(),
        ));
    };

    let callback_url = public_base_url(&state, &headers).and_then(|base| {
        http_url(&base, INCOMING_CALL_PATH)
            .map_err(|e| AppError::BadRequest(format!("Cannot build callback URL: {e}")))
    })?;

    let call = twilio.place_call(&to, &callback_url).await?;

    if let Some(text) = instructions {
        state.briefing.replace(text);
    }

    Ok(Json(OutboundCallResponse {
        status: call.status.unwrap_or_else(|| "queued".to_string()),
        call_sid: call.sid,
        to,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn state(public_url: Option<&str>) -> Arc<AppState> {
        let mut config = ServerConfig::default();
        config.public_url = public_url.map(str::to_string);
        AppState::with_http_client(config, reqwest::Client::new())
    }

    #[test]
    fn test_public_base_prefers_config() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "ignored.example.com".parse().unwrap());
        let base = public_base_url(&state(Some("https://bridge.example.com")), &headers).unwrap();
        assert_eq!(base, "https://bridge.example.com");
    }

    #[test]
    fn test_public_base_falls_back_to_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "abc.ngrok.app".parse().unwrap());
        let base = public_base_url(&state(None), &headers).unwrap();
        assert_eq!(base, "https://abc.ngrok.app");
    }

    #[test]
    fn test_public_base_requires_host() {
        let err = public_base_url(&state(None), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
