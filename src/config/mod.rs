//! Configuration module for the call bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_call_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::realtime::openai::{
    DEFAULT_TEMPERATURE, Modality, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
use crate::core::realtime::{DEFAULT_SESSION_SETTLE_MS, RealtimeConfig};
use crate::core::telephony::{TWILIO_API_BASE, TwilioCallClient};

/// Briefing used when neither the environment nor the YAML file provides one.
pub const DEFAULT_AGENT_INSTRUCTIONS: &str = "You are a helpful and friendly phone assistant. \
Keep your answers short and conversational, and let the caller interrupt you at any time.";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the call bridge, including:
/// - Server settings (host, port, TLS, public URL)
/// - OpenAI Realtime credentials and agent settings
/// - Twilio credentials for outbound calls
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Externally reachable base URL (e.g. `https://bridge.example.com`).
    /// Used to build the media-stream URL in call-setup markup and the callback
    /// for outbound calls. When unset, the request `Host` header is used.
    pub public_url: Option<String>,

    // Speech-AI settings
    pub openai_api_key: Option<String>,
    pub openai_realtime_url: String,
    pub openai_realtime_model: OpenAIRealtimeModel,
    pub agent_voice: OpenAIRealtimeVoice,
    pub agent_temperature: f32,
    /// Initial agent briefing; replaced at runtime by outbound-call requests
    pub agent_instructions: String,
    /// Fallback delay before the session configuration is sent
    pub session_settle_ms: u64,

    // Twilio settings (only needed for outbound calls)
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_api_base: String,

    /// Optional `<Say>` greeting played before the stream connects
    pub call_greeting: Option<String>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    /// Maximum concurrent media-stream connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
    }
}

/// Defaults used when neither the environment nor YAML sets a value.
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: merge::DEFAULT_HOST.to_string(),
            port: merge::DEFAULT_PORT,
            tls: None,
            public_url: None,
            openai_api_key: None,
            openai_realtime_url: OPENAI_REALTIME_URL.to_string(),
            openai_realtime_model: OpenAIRealtimeModel::default(),
            agent_voice: OpenAIRealtimeVoice::default(),
            agent_temperature: DEFAULT_TEMPERATURE,
            agent_instructions: DEFAULT_AGENT_INSTRUCTIONS.to_string(),
            session_settle_ms: DEFAULT_SESSION_SETTLE_MS,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_api_base: TWILIO_API_BASE.to_string(),
            call_greeting: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: merge::DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: merge::DEFAULT_RATE_LIMIT_BURST,
            max_websocket_connections: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs, so by now it is part of the environment
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether every credential needed to place outbound calls is present
    pub fn has_twilio_credentials(&self) -> bool {
        self.twilio_account_sid.is_some()
            && self.twilio_auth_token.is_some()
            && self.twilio_phone_number.is_some()
    }

    /// Get the OpenAI API key
    pub fn get_openai_api_key(&self) -> Result<String, String> {
        self.openai_api_key
            .as_ref()
            .cloned()
            .ok_or_else(|| "OpenAI API key not configured in server environment".to_string())
    }

    /// Build the speech-AI configuration for one call.
    ///
    /// `instructions` is the briefing snapshot taken when the call started.
    pub fn realtime_config(&self, instructions: String) -> Result<RealtimeConfig, String> {
        let format = OpenAIRealtimeAudioFormat::G711Ulaw.as_str().to_string();
        Ok(RealtimeConfig {
            api_key: self.get_openai_api_key()?,
            url: self.openai_realtime_url.clone(),
            model: self.openai_realtime_model.as_str().to_string(),
            voice: Some(self.agent_voice.as_str().to_string()),
            instructions: Some(instructions),
            temperature: Some(self.agent_temperature),
            input_audio_format: Some(format.clone()),
            output_audio_format: Some(format),
            modalities: Some(Modality::phone_defaults()),
            session_settle_ms: self.session_settle_ms,
            wait_for_session_created: true,
        })
    }

    /// Build the call-placement client, if Twilio is configured.
    pub fn twilio_client(&self, http: reqwest::Client) -> Option<TwilioCallClient> {
        match (
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_phone_number,
        ) {
            (Some(sid), Some(token), Some(from)) => Some(TwilioCallClient::new(
                http,
                &self.twilio_api_base,
                sid.clone(),
                token.clone(),
                from.clone(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    /// Helper function to create a test ServerConfig with defaults
    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.host = "localhost".to_string();
        config.openai_api_key = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_address() {
        assert_eq!(test_config().address(), "localhost:5050");
        assert!(!test_config().is_tls_enabled());
    }

    #[test]
    fn test_realtime_config_uses_snapshot() {
        let config = test_config();
        let realtime = config.realtime_config("Sell tickets.".to_string()).unwrap();

        assert_eq!(realtime.api_key, "sk-test");
        assert_eq!(realtime.instructions.as_deref(), Some("Sell tickets."));
        assert_eq!(realtime.voice.as_deref(), Some("alloy"));
        assert_eq!(realtime.input_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(realtime.output_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(realtime.modalities, Some(vec!["text".to_string(), "audio".to_string()]));
        assert_eq!(realtime.temperature, Some(0.8));
        assert_eq!(realtime.session_settle_ms, 250);
    }

    #[test]
    fn test_realtime_config_requires_api_key() {
        let mut config = test_config();
        config.openai_api_key = None;
        assert!(config.realtime_config(String::new()).is_err());
    }

    #[test]
    fn test_twilio_client_requires_all_credentials() {
        let mut config = test_config();
        assert!(!config.has_twilio_credentials());
        assert!(config.twilio_client(reqwest::Client::new()).is_none());

        config.twilio_account_sid = Some("AC123".to_string());
        config.twilio_auth_token = Some("token".to_string());
        assert!(config.twilio_client(reqwest::Client::new()).is_none());

        config.twilio_phone_number = Some("+15550001111".to_string());
        assert!(config.has_twilio_credentials());
        assert!(config.twilio_client(reqwest::Client::new()).is_some());
    }

    // Helper to clean up environment variables
    pub(super) fn cleanup_env_vars() {
        unsafe {
            for key in [
                "HOST",
                "PORT",
                "TLS_ENABLED",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
                "PUBLIC_URL",
                "OPENAI_API_KEY",
                "OPENAI_REALTIME_URL",
                "OPENAI_REALTIME_MODEL",
                "AGENT_VOICE",
                "AGENT_TEMPERATURE",
                "AGENT_INSTRUCTIONS",
                "SESSION_SETTLE_MS",
                "TWILIO_ACCOUNT_SID",
                "TWILIO_AUTH_TOKEN",
                "TWILIO_PHONE_NUMBER",
                "TWILIO_API_BASE",
                "CALL_GREETING",
                "CORS_ALLOWED_ORIGINS",
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                "RATE_LIMIT_BURST_SIZE",
                "MAX_WEBSOCKET_CONNECTIONS",
            ] {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_url: "https://bridge.example.com"

openai:
  api_key: "yaml-openai-key"
  voice: "shimmer"

agent:
  instructions: "Be brief."
  greeting: "Connecting you now."
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_url.as_deref(), Some("https://bridge.example.com"));
        assert_eq!(config.openai_api_key, Some("yaml-openai-key".to_string()));
        assert_eq!(config.agent_voice, OpenAIRealtimeVoice::Shimmer);
        assert_eq!(config.agent_instructions, "Be brief.");
        assert_eq!(config.call_greeting.as_deref(), Some("Connecting you now."));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"

openai:
  api_key: "yaml-key"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("PORT", "9000");
            env::set_var("OPENAI_API_KEY", "env-key");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.openai_api_key, Some("yaml-key".to_string()));
        // ENV value survives where YAML is silent
        assert_eq!(config.port, 9000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_public_url() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "server:\n  public_url: \"ftp://bridge.example.com\"\n",
        )
        .unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("PUBLIC_URL"));

        cleanup_env_vars();
    }
}
