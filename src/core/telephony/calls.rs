//! Outbound call placement through the Twilio REST API.
//!
//! The bridge itself only consumes media streams; this client asks the provider
//! to dial a number and fetch call-setup markup from our callback URL, which in
//! turn opens a media stream back to the bridge.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

/// Default Twilio REST API base URL
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Request timeout for call placement
const CALL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by call placement.
#[derive(Debug, Error)]
pub enum CallPlacementError {
    /// The HTTP request could not be sent or the response not read
    #[error("Call placement request failed: {0}")]
    Transport(String),

    /// The provider rejected the request
    #[error("Provider rejected call ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// The provider answered success without a call identifier
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A call accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlacedCall {
    /// Provider call identifier
    pub sid: String,
    /// Initial call status (usually "queued")
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Minimal Twilio client for placing calls.
#[derive(Clone)]
pub struct TwilioCallClient {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl std::fmt::Debug for TwilioCallClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCallClient")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("from_number", &self.from_number)
            .finish_non_exhaustive()
    }
}

impl TwilioCallClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base, self.account_sid
        )
    }

    /// Ask the provider to dial `to`; it will fetch call-setup markup from `callback_url`.
    pub async fn place_call(
        &self,
        to: &str,
        callback_url: &str,
    ) -> Result<PlacedCall, CallPlacementError> {
        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(CALL_REQUEST_TIMEOUT)
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", callback_url),
                ("Method", "POST"),
            ])
            .send()
            .await
            .map_err(|e| CallPlacementError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallPlacementError::Transport(e.to_string()))?;

        if !status.is_success() {
            let parsed: Option<TwilioErrorBody> = serde_json::from_str(&body).ok();
            let (code, message) = match parsed {
                Some(b) => (b.code, b.message.unwrap_or_else(|| body.clone())),
                None => (None, body),
            };
            error!(status = status.as_u16(), ?code, "Twilio rejected outbound call");
            return Err(CallPlacementError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let call: PlacedCall = serde_json::from_str(&body)
            .map_err(|e| CallPlacementError::InvalidResponse(e.to_string()))?;

        info!(call_sid = %call.sid, to, "Outbound call placed");
        Ok(call)
    }
}
