//! Base traits and types for the speech-AI leg of a call.
//!
//! A realtime provider owns one WebSocket connection per call. Audio from the
//! caller goes in through [`BaseRealtime::send_audio`]; everything the provider
//! says comes back as [`RealtimeEvent`]s on a bounded channel that the bridge
//! consumes from its event loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::openai::ServerEvent;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the speech-AI leg.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Outbound queue is full; the frame was dropped
    #[error("Outbound queue full, frame dropped")]
    Backpressure,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Default delay before configuring the session when the provider never
/// announces `session.created`.
pub const DEFAULT_SESSION_SETTLE_MS: u64 = 250;

/// Configuration for one speech-AI connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint (without query string)
    #[serde(default)]
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview")
    #[serde(default)]
    pub model: String,

    /// Voice ID for the agent
    #[serde(default)]
    pub voice: Option<String>,

    /// Agent briefing, captured when the call started
    #[serde(default)]
    pub instructions: Option<String>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Input audio format (e.g., "g711_ulaw")
    #[serde(default)]
    pub input_audio_format: Option<String>,

    /// Output audio format (e.g., "g711_ulaw")
    #[serde(default)]
    pub output_audio_format: Option<String>,

    /// Response modalities
    #[serde(default)]
    pub modalities: Option<Vec<String>>,

    /// Fallback delay before sending the session configuration
    #[serde(default = "default_settle_ms")]
    pub session_settle_ms: u64,

    /// Send the session configuration as soon as `session.created` arrives
    #[serde(default = "default_true")]
    pub wait_for_session_created: bool,
}

fn default_settle_ms() -> u64 {
    DEFAULT_SESSION_SETTLE_MS
}

fn default_true() -> bool {
    true
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: String::new(),
            model: String::new(),
            voice: None,
            instructions: None,
            temperature: None,
            input_audio_format: None,
            output_audio_format: None,
            modalities: None,
            session_settle_ms: DEFAULT_SESSION_SETTLE_MS,
            wait_for_session_created: true,
        }
    }
}

impl RealtimeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.session_settle_ms)
    }
}

/// Connection state of the speech-AI leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The connection ended; it is never reopened
    Closed,
}

/// Events delivered from the speech-AI leg to the bridge.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// A parsed provider event
    Server(ServerEvent),
    /// The connection ended (close frame, socket error, or local disconnect)
    Closed { reason: String },
}

// =============================================================================
// Provider Trait
// =============================================================================

/// A speech-AI connection used by exactly one call.
#[async_trait]
pub trait BaseRealtime: Send {
    /// Open the connection and start delivering events.
    async fn connect(&mut self) -> RealtimeResult<()>;

    /// Close the connection. Safe to call more than once.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    /// Whether frames can currently be sent.
    fn is_ready(&self) -> bool;

    fn get_connection_state(&self) -> ConnectionState;

    /// Hand over the event receiver. Returns `None` after the first call.
    fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<RealtimeEvent>>;

    /// Append caller audio (base64, already in the provider's input format).
    async fn send_audio(&mut self, payload: String) -> RealtimeResult<()>;

    /// Discard assistant audio past `audio_end_ms` for `item_id`.
    async fn truncate_item(&mut self, item_id: &str, audio_end_ms: u64) -> RealtimeResult<()>;
}

/// Boxed provider type used by the bridge.
pub type BoxedRealtime = Box<dyn BaseRealtime>;
