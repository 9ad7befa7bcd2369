//! OpenAI Realtime API leg.
//!
//! One [`OpenAIRealtime`] is created per phone call. It sends the session
//! configuration (voice, G.711 u-law in both directions, server VAD, the agent
//! briefing, modalities, temperature), relays caller audio, truncates assistant
//! items on barge-in, and delivers parsed server events to the bridge.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_TEMPERATURE, Modality, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, EventEnvelope, RateLimit, ResponseInfo, ServerEvent, SessionConfig,
    SessionInfo, TurnDetection,
};
