//! Merging environment variables (base) with YAML overrides.

use std::path::PathBuf;

use super::env::{env_bool, env_parse, env_var};
use super::yaml::YamlConfig;
use super::{DEFAULT_AGENT_INSTRUCTIONS, ServerConfig, TlsConfig};
use crate::core::realtime::DEFAULT_SESSION_SETTLE_MS;
use crate::core::realtime::openai::{
    DEFAULT_TEMPERATURE, OPENAI_REALTIME_URL, OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
use crate::core::telephony::TWILIO_API_BASE;

pub(super) const DEFAULT_HOST: &str = "0.0.0.0";
pub(super) const DEFAULT_PORT: u16 = 5050;
pub(super) const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub(super) const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Build the final configuration: YAML > environment > defaults.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let tls_yaml = server.tls.clone().unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let agent = yaml.agent.unwrap_or_default();
    let twilio = yaml.twilio.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let host = server
        .host
        .or_else(|| env_var("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match server.port {
        Some(port) => port,
        None => env_parse::<u16>("PORT")?.unwrap_or(DEFAULT_PORT),
    };

    let tls_enabled = match tls_yaml.enabled {
        Some(enabled) => enabled,
        None => env_bool("TLS_ENABLED")?.unwrap_or(false),
    };
    let tls = if tls_enabled {
        let cert_path = tls_yaml
            .cert_path
            .or_else(|| env_var("TLS_CERT_PATH"))
            .ok_or("TLS is enabled but TLS_CERT_PATH is not set")?;
        let key_path = tls_yaml
            .key_path
            .or_else(|| env_var("TLS_KEY_PATH"))
            .ok_or("TLS is enabled but TLS_KEY_PATH is not set")?;
        Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })
    } else {
        None
    };

    let public_url = server
        .public_url
        .or_else(|| env_var("PUBLIC_URL"))
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty());

    let openai_realtime_model = openai
        .model
        .or_else(|| env_var("OPENAI_REALTIME_MODEL"))
        .map(|m| OpenAIRealtimeModel::from_str_or_default(&m))
        .unwrap_or_default();
    let agent_voice = openai
        .voice
        .or_else(|| env_var("AGENT_VOICE"))
        .map(|v| OpenAIRealtimeVoice::from_str_or_default(&v))
        .unwrap_or_default();
    let agent_temperature = match openai.temperature {
        Some(t) => t,
        None => env_parse::<f32>("AGENT_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE),
    };
    let session_settle_ms = match openai.session_settle_ms {
        Some(ms) => ms,
        None => env_parse::<u64>("SESSION_SETTLE_MS")?.unwrap_or(DEFAULT_SESSION_SETTLE_MS),
    };

    let rate_limit_requests_per_second = match security.rate_limit_requests_per_second {
        Some(rps) => rps,
        None => env_parse::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")?
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
    };
    let rate_limit_burst_size = match security.rate_limit_burst_size {
        Some(burst) => burst,
        None => env_parse::<u32>("RATE_LIMIT_BURST_SIZE")?.unwrap_or(DEFAULT_RATE_LIMIT_BURST),
    };
    let max_websocket_connections = match security.max_websocket_connections {
        Some(max) => Some(max),
        None => env_parse::<usize>("MAX_WEBSOCKET_CONNECTIONS")?,
    };

    Ok(ServerConfig {
        host,
        port,
        tls,
        public_url,
        openai_api_key: openai.api_key.or_else(|| env_var("OPENAI_API_KEY")),
        openai_realtime_url: openai
            .realtime_url
            .or_else(|| env_var("OPENAI_REALTIME_URL"))
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        openai_realtime_model,
        agent_voice,
        agent_temperature,
        agent_instructions: agent
            .instructions
            .or_else(|| env_var("AGENT_INSTRUCTIONS"))
            .unwrap_or_else(|| DEFAULT_AGENT_INSTRUCTIONS.to_string()),
        session_settle_ms,
        twilio_account_sid: twilio.account_sid.or_else(|| env_var("TWILIO_ACCOUNT_SID")),
        twilio_auth_token: twilio.auth_token.or_else(|| env_var("TWILIO_AUTH_TOKEN")),
        twilio_phone_number: twilio
            .phone_number
            .or_else(|| env_var("TWILIO_PHONE_NUMBER")),
        twilio_api_base: twilio
            .api_base
            .or_else(|| env_var("TWILIO_API_BASE"))
            .unwrap_or_else(|| TWILIO_API_BASE.to_string()),
        call_greeting: agent
            .greeting
            .or_else(|| env_var("CALL_GREETING"))
            .filter(|g| !g.trim().is_empty()),
        cors_allowed_origins: security
            .cors_allowed_origins
            .or_else(|| env_var("CORS_ALLOWED_ORIGINS")),
        rate_limit_requests_per_second,
        rate_limit_burst_size,
        max_websocket_connections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{AgentYaml, SecurityYaml, ServerYaml};
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_merge_yaml_wins_over_env() {
        crate::config::tests::cleanup_env_vars();
        unsafe {
            env::set_var("AGENT_INSTRUCTIONS", "from env");
            env::set_var("RATE_LIMIT_BURST_SIZE", "3");
        }

        let yaml = YamlConfig {
            agent: Some(AgentYaml {
                instructions: Some("from yaml".to_string()),
                greeting: None,
            }),
            security: Some(SecurityYaml {
                rate_limit_burst_size: Some(7),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.agent_instructions, "from yaml");
        assert_eq!(config.rate_limit_burst_size, 7);

        crate::config::tests::cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_trims_public_url() {
        crate::config::tests::cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                public_url: Some("https://bridge.example.com///".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.public_url.as_deref(), Some("https://bridge.example.com"));
    }
}
