//! Speech-AI leg of the bridge.
//!
//! # Architecture
//!
//! - `BaseRealtime` trait for the provider connection, so the bridge can be
//!   driven by a test double
//! - Events flow to the bridge over a bounded channel instead of callbacks, which
//!   keeps all session mutation on the bridge's own task
//! - Outbound sends never wait: when the leg is not open or its queue is full the
//!   frame is dropped
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API**

mod base;
pub mod openai;

pub use base::{
    BaseRealtime, BoxedRealtime, ConnectionState, DEFAULT_SESSION_SETTLE_MS, RealtimeConfig,
    RealtimeError, RealtimeEvent, RealtimeResult,
};
pub use openai::{ClientEvent, OpenAIRealtime, ServerEvent};

/// Providers the bridge can create.
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai"]
}

/// Create a speech-AI leg by provider name.
pub fn create_realtime_provider(
    provider: &str,
    config: RealtimeConfig,
) -> RealtimeResult<BoxedRealtime> {
    match provider.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAIRealtime::new(config)?)),
        other => Err(RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider: {other}. Supported: {:?}",
            get_supported_realtime_providers()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_provider() {
        let config = RealtimeConfig {
            api_key: "key".to_string(),
            ..Default::default()
        };
        let provider = create_realtime_provider("OpenAI", config).unwrap();
        assert!(!provider.is_ready());
        assert_eq!(provider.get_connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = RealtimeConfig {
            api_key: "key".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_realtime_provider("hume", config),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }
}
